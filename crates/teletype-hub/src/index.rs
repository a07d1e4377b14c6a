//! Room index: room name → set of member connections.
//!
//! Rooms have no existence of their own. A room appears when its first
//! member is inserted and disappears when its last member is removed, so
//! the index never holds an empty set.

use std::collections::{HashMap, HashSet};

use teletype_transport::ConnectionId;

/// Maps room names to the connections currently in them.
///
/// The index does not enforce single-room membership by itself; the hub
/// removes a connection from its old room before inserting it into a new
/// one, in the same command.
#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RoomIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` to `room`, creating the room if needed.
    ///
    /// Returns `false` if it was already a member.
    pub fn insert(&mut self, room: &str, id: ConnectionId) -> bool {
        self.rooms.entry(room.to_string()).or_default().insert(id)
    }

    /// Removes `id` from `room`, dropping the room once it is empty.
    ///
    /// Returns `false` if it was not a member.
    pub fn remove(&mut self, room: &str, id: ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            self.rooms.remove(room);
            tracing::debug!(room, "room emptied and removed");
        }
        removed
    }

    /// Iterates over the members of `room` (empty if it doesn't exist).
    pub fn members(&self, room: &str) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(room).into_iter().flatten().copied()
    }

    /// Returns `true` if `id` is in `room`.
    pub fn contains(&self, room: &str, id: ConnectionId) -> bool {
        self.rooms.get(room).is_some_and(|m| m.contains(&id))
    }

    /// Number of members in `room`.
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` if no room has members.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Iterates over every room and its members.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HashSet<ConnectionId>)> {
        self.rooms.iter().map(|(name, members)| (name.as_str(), members))
    }

    /// Every room `id` belongs to. Under the hub's invariant this has at
    /// most one element; used to check that invariant.
    pub fn rooms_of(&self, id: ConnectionId) -> Vec<&str> {
        self.rooms
            .iter()
            .filter(|(_, members)| members.contains(&id))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

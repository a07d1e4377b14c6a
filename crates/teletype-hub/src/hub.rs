//! Hub actor: the single task that owns connection and room state.
//!
//! Every mutation of the live set, the room index and each peer's room
//! happens inside [`Hub::run`], one command at a time, in arrival order.
//! Outside code only holds a [`HubHandle`] and sends commands.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};

use teletype_protocol::Message;
use teletype_transport::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::peer::Peer;
use crate::{ConnectionState, HubConfig, HubError, RoomIndex};

/// Receiving half of a connection's outbound queue. The writer pump is
/// its only consumer; it yields `None` once the hub drops the peer.
pub type Outbound = mpsc::Receiver<Message>;

/// Commands sent to the hub through its channel.
pub(crate) enum HubCommand {
    Register {
        id: ConnectionId,
        identity: String,
        outbound: mpsc::Sender<Message>,
    },
    Unregister {
        id: ConnectionId,
    },
    Join {
        id: ConnectionId,
        room: String,
    },
    Rename {
        id: ConnectionId,
        name: String,
    },
    Route {
        from: Option<ConnectionId>,
        message: Message,
    },
    Snapshot {
        reply: oneshot::Sender<HubSnapshot>,
    },
    #[cfg(test)]
    Panic,
}

impl HubCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
            Self::Join { .. } => "join",
            Self::Rename { .. } => "rename",
            Self::Route { .. } => "route",
            Self::Snapshot { .. } => "snapshot",
            #[cfg(test)]
            Self::Panic => "panic",
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// What the hub knows about one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: ConnectionId,
    pub identity: String,
    pub display_name: Option<String>,
    pub room: Option<String>,
    pub state: ConnectionState,
}

/// A read-only copy of the hub's state, taken between two commands.
#[derive(Debug, Clone, Default)]
pub struct HubSnapshot {
    /// Live peers, ordered by connection ID.
    pub peers: Vec<PeerInfo>,
    /// Room name → members ordered by connection ID.
    pub rooms: BTreeMap<String, Vec<ConnectionId>>,
}

impl HubSnapshot {
    /// Looks up a peer by connection ID.
    pub fn peer(&self, id: ConnectionId) -> Option<&PeerInfo> {
        self.peers
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &self.peers[i])
    }

    /// Returns `true` if `id` is in the live set.
    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.peer(id).is_some()
    }

    /// Members of `room` (empty if the room doesn't exist).
    pub fn room_members(&self, room: &str) -> &[ConnectionId] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// HubHandle
// ---------------------------------------------------------------------------

/// Handle to the running hub. Cheap to clone; one per connection task.
///
/// Every method except [`snapshot`](Self::snapshot) only enqueues a
/// command and returns immediately.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::UnboundedSender<HubCommand>,
    outbound_capacity: usize,
}

impl HubHandle {
    fn command(&self, cmd: HubCommand) -> Result<(), HubError> {
        self.sender.send(cmd).map_err(|_| HubError::Unavailable)
    }

    /// Adds a connection to the live set and returns its outbound queue.
    pub fn register(
        &self,
        id: ConnectionId,
        identity: impl Into<String>,
    ) -> Result<Outbound, HubError> {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        self.command(HubCommand::Register {
            id,
            identity: identity.into(),
            outbound: tx,
        })?;
        Ok(rx)
    }

    /// Removes a connection from the live set and its room, closing its
    /// outbound queue. Unknown connections are ignored.
    pub fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.command(HubCommand::Unregister { id })
    }

    /// Moves a connection into `room`, leaving its previous room.
    pub fn join_room(
        &self,
        id: ConnectionId,
        room: impl Into<String>,
    ) -> Result<(), HubError> {
        self.command(HubCommand::Join {
            id,
            room: room.into(),
        })
    }

    /// Records a connection's display name.
    pub fn set_name(
        &self,
        id: ConnectionId,
        name: impl Into<String>,
    ) -> Result<(), HubError> {
        self.command(HubCommand::Rename {
            id,
            name: name.into(),
        })
    }

    /// Fans a server message out to its room, or to everyone if `room`
    /// is empty.
    pub fn route(&self, message: Message) -> Result<(), HubError> {
        self.command(HubCommand::Route {
            from: None,
            message,
        })
    }

    /// Fans a message from connection `from` out to the room the hub has
    /// that connection in. The message's own `room` is overwritten. It is
    /// dropped if `from` is no longer live or is in no room.
    pub fn route_from(&self, from: ConnectionId, message: Message) -> Result<(), HubError> {
        self.command(HubCommand::Route {
            from: Some(from),
            message,
        })
    }

    /// Asks the hub for a copy of its current state.
    pub async fn snapshot(&self) -> Result<HubSnapshot, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(HubCommand::Snapshot { reply: reply_tx })?;
        reply_rx.await.map_err(|_| HubError::Unavailable)
    }

    /// Returns `true` once the hub task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Hub actor
// ---------------------------------------------------------------------------

/// The hub actor state. Runs inside a Tokio task.
struct Hub {
    peers: HashMap<ConnectionId, Peer>,
    rooms: RoomIndex,
    receiver: mpsc::UnboundedReceiver<HubCommand>,
}

impl Hub {
    /// Processes commands until every handle has been dropped.
    async fn run(mut self) {
        tracing::info!("hub started");

        while let Some(cmd) = self.receiver.recv().await {
            let name = cmd.name();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| self.handle(cmd)));
            if let Err(payload) = outcome {
                tracing::error!(
                    command = name,
                    panic = panic_message(payload.as_ref()),
                    "hub command panicked; continuing"
                );
            }
        }

        tracing::info!(peers = self.peers.len(), "hub stopped");
    }

    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register {
                id,
                identity,
                outbound,
            } => self.handle_register(id, identity, outbound),
            HubCommand::Unregister { id } => {
                if self.remove_peer(id).is_some() {
                    tracing::info!(%id, peers = self.peers.len(), "peer unregistered");
                } else {
                    tracing::trace!(%id, "unregister for unknown peer ignored");
                }
            }
            HubCommand::Join { id, room } => self.handle_join(id, room),
            HubCommand::Rename { id, name } => {
                if let Some(peer) = self.peers.get_mut(&id) {
                    let previous = peer.identity.rename(name);
                    tracing::debug!(
                        %id,
                        %previous,
                        name = peer.identity.trusted_name(),
                        "peer renamed"
                    );
                }
            }
            HubCommand::Route { from, message } => self.handle_route(from, message),
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            #[cfg(test)]
            HubCommand::Panic => panic!("injected hub failure"),
        }
    }

    fn handle_register(
        &mut self,
        id: ConnectionId,
        identity: String,
        outbound: mpsc::Sender<Message>,
    ) {
        if self.peers.contains_key(&id) {
            tracing::warn!(%id, "connection registered twice; replacing");
            self.remove_peer(id);
        }
        tracing::info!(%id, %identity, peers = self.peers.len() + 1, "peer registered");
        self.peers.insert(id, Peer::new(identity, outbound));
    }

    fn handle_join(&mut self, id: ConnectionId, room: String) {
        if room.is_empty() {
            tracing::debug!(%id, "join with empty room ignored");
            return;
        }
        let Some(peer) = self.peers.get_mut(&id) else {
            tracing::debug!(%id, %room, "join from unknown peer ignored");
            return;
        };
        if peer.room.as_deref() == Some(room.as_str()) {
            return;
        }

        // Leave and join in one step so the index and `peer.room` never
        // disagree.
        if let Some(previous) = peer.room.take() {
            self.rooms.remove(&previous, id);
        }
        self.rooms.insert(&room, id);
        peer.state = ConnectionState::RoomAssigned;
        tracing::info!(
            %id,
            %room,
            members = self.rooms.member_count(&room),
            "peer joined room"
        );
        peer.room = Some(room);
    }

    fn handle_route(&mut self, from: Option<ConnectionId>, mut message: Message) {
        if let Some(from) = from {
            // Peer messages go to the room the hub has the peer in, and
            // nowhere once it has been evicted.
            let Some(room) = self.peers.get(&from).and_then(|p| p.room.as_deref()) else {
                tracing::debug!(
                    id = %from,
                    kind = %message.kind,
                    "message from peer outside any room dropped"
                );
                return;
            };
            message.room = room.to_owned();
        }

        let targets: Vec<ConnectionId> = if message.is_global() {
            self.peers.keys().copied().collect()
        } else {
            self.rooms.members(&message.room).collect()
        };

        let mut evicted = Vec::new();
        for id in targets {
            let Some(peer) = self.peers.get(&id) else {
                continue;
            };
            match peer.outbound.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%id, "outbound queue full, evicting slow peer");
                    evicted.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(%id, "outbound queue closed, evicting peer");
                    evicted.push(id);
                }
            }
        }

        tracing::trace!(
            room = %message.room,
            kind = %message.kind,
            evicted = evicted.len(),
            "message routed"
        );

        for id in evicted {
            self.remove_peer(id);
        }
    }

    /// Drops a peer from the live set and its room. Dropping the returned
    /// peer closes its outbound queue.
    fn remove_peer(&mut self, id: ConnectionId) -> Option<Peer> {
        let mut peer = self.peers.remove(&id)?;
        if let Some(room) = peer.room.take() {
            self.rooms.remove(&room, id);
        }
        peer.state = ConnectionState::Unregistering;
        Some(peer)
    }

    fn snapshot(&self) -> HubSnapshot {
        let mut peers: Vec<PeerInfo> = self
            .peers
            .iter()
            .map(|(id, peer)| peer.info(*id))
            .collect();
        peers.sort_by_key(|p| p.id);

        let rooms = self
            .rooms
            .iter()
            .map(|(name, members)| {
                let mut members: Vec<ConnectionId> =
                    members.iter().copied().collect();
                members.sort();
                (name.to_string(), members)
            })
            .collect();

        HubSnapshot { peers, rooms }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Spawns the hub task and returns a handle to it.
///
/// The hub runs until every clone of the handle is dropped.
pub fn spawn_hub(config: HubConfig) -> HubHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let hub = Hub {
        peers: HashMap::new(),
        rooms: RoomIndex::new(),
        receiver: rx,
    };

    tokio::spawn(hub.run());

    HubHandle {
        sender: tx,
        outbound_capacity: config.outbound_capacity.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn bare_hub() -> Hub {
        let (_tx, rx) = mpsc::unbounded_channel();
        Hub {
            peers: HashMap::new(),
            rooms: RoomIndex::new(),
            receiver: rx,
        }
    }

    fn register(hub: &mut Hub, id: u64, capacity: usize) -> Outbound {
        let (tx, rx) = mpsc::channel(capacity);
        hub.handle_register(cid(id), format!("10.0.0.{id}:5000"), tx);
        rx
    }

    #[test]
    fn test_join_switches_rooms_atomically() {
        let mut hub = bare_hub();
        let _rx = register(&mut hub, 1, 4);

        hub.handle_join(cid(1), "a".into());
        hub.handle_join(cid(1), "b".into());

        assert_eq!(hub.rooms.rooms_of(cid(1)), vec!["b"]);
        assert_eq!(hub.rooms.room_count(), 1, "room a should be pruned");
        assert_eq!(hub.peers[&cid(1)].room.as_deref(), Some("b"));
        assert_eq!(hub.peers[&cid(1)].state, ConnectionState::RoomAssigned);
    }

    #[test]
    fn test_join_empty_room_is_ignored() {
        let mut hub = bare_hub();
        let _rx = register(&mut hub, 1, 4);

        hub.handle_join(cid(1), String::new());

        assert!(hub.rooms.is_empty());
        assert_eq!(hub.peers[&cid(1)].state, ConnectionState::Registered);
    }

    #[test]
    fn test_remove_peer_closes_outbound_queue() {
        let mut hub = bare_hub();
        let mut rx = register(&mut hub, 1, 4);
        hub.handle_join(cid(1), "a".into());

        let removed = hub.remove_peer(cid(1)).expect("peer was registered");
        assert_eq!(removed.state, ConnectionState::Unregistering);
        drop(removed);

        assert!(hub.rooms.is_empty());
        assert!(rx.try_recv().is_err());
        assert!(rx.is_closed());
    }

    #[test]
    fn test_route_full_queue_evicts_without_blocking() {
        let mut hub = bare_hub();
        let _slow = register(&mut hub, 1, 1);
        let mut fast = register(&mut hub, 2, 8);
        hub.handle_join(cid(1), "a".into());
        hub.handle_join(cid(2), "a".into());

        hub.handle_route(None, Message::chat("x", "one", "a"));
        hub.handle_route(None, Message::chat("x", "two", "a"));

        assert!(!hub.peers.contains_key(&cid(1)));
        assert!(!hub.rooms.contains("a", cid(1)));
        assert_eq!(fast.try_recv().unwrap().content, "one");
        assert_eq!(fast.try_recv().unwrap().content, "two");
    }

    #[test]
    fn test_route_closed_queue_evicts() {
        let mut hub = bare_hub();
        let rx = register(&mut hub, 1, 4);
        hub.handle_join(cid(1), "a".into());
        drop(rx);

        hub.handle_route(None, Message::chat("x", "hello", "a"));

        assert!(hub.peers.is_empty());
        assert!(hub.rooms.is_empty());
    }

    #[test]
    fn test_route_from_evicted_peer_is_dropped() {
        let mut hub = bare_hub();
        let _slow = register(&mut hub, 1, 1);
        let mut fast = register(&mut hub, 2, 8);
        hub.handle_join(cid(1), "a".into());
        hub.handle_join(cid(2), "a".into());
        hub.handle_route(None, Message::chat("x", "one", "a"));
        hub.handle_route(None, Message::chat("x", "two", "a"));
        assert!(!hub.peers.contains_key(&cid(1)));

        hub.handle_route(Some(cid(1)), Message::chat("10.0.0.1:5000", "ghost", "a"));

        assert_eq!(fast.try_recv().unwrap().content, "one");
        assert_eq!(fast.try_recv().unwrap().content, "two");
        assert!(fast.try_recv().is_err());
    }

    #[test]
    fn test_route_from_uses_hub_room() {
        let mut hub = bare_hub();
        let _a = register(&mut hub, 1, 4);
        let mut b = register(&mut hub, 2, 4);
        let mut c = register(&mut hub, 3, 4);
        hub.handle_join(cid(1), "a".into());
        hub.handle_join(cid(2), "a".into());
        hub.handle_join(cid(3), "b".into());

        hub.handle_route(Some(cid(1)), Message::chat("x", "hi", "b"));

        let got = b.try_recv().unwrap();
        assert_eq!(got.content, "hi");
        assert_eq!(got.room, "a");
        assert!(c.try_recv().is_err());
    }

    #[test]
    fn test_route_from_peer_without_room_is_dropped() {
        let mut hub = bare_hub();
        let _a = register(&mut hub, 1, 4);
        let mut b = register(&mut hub, 2, 4);

        // An empty room would otherwise mean "everyone".
        hub.handle_route(Some(cid(1)), Message::chat("x", "hi", ""));

        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hub_survives_panicking_command() {
        let handle = spawn_hub(HubConfig::default());
        handle.command(HubCommand::Panic).unwrap();

        let mut rx = handle.register(cid(1), "10.0.0.1:5000").unwrap();
        handle.join_room(cid(1), "a").unwrap();
        handle.route(Message::chat("x", "after", "a")).unwrap();

        let snap = handle.snapshot().await.expect("hub should still answer");
        assert_eq!(snap.room_members("a"), &[cid(1)]);
        assert_eq!(rx.recv().await.unwrap().content, "after");
        assert!(!handle.is_closed());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let mut hub = bare_hub();
        let _r3 = register(&mut hub, 3, 4);
        let _r1 = register(&mut hub, 1, 4);
        let _r2 = register(&mut hub, 2, 4);
        hub.handle_join(cid(3), "a".into());
        hub.handle_join(cid(1), "a".into());

        let snap = hub.snapshot();
        let ids: Vec<_> = snap.peers.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![cid(1), cid(2), cid(3)]);
        assert_eq!(snap.room_members("a"), &[cid(1), cid(3)]);
        assert_eq!(snap.peer(cid(2)).unwrap().room, None);
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}

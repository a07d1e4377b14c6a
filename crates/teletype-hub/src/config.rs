//! Hub configuration and the per-connection state machine.

// ---------------------------------------------------------------------------
// HubConfig
// ---------------------------------------------------------------------------

/// Configuration for the hub task.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue. A peer whose queue
    /// is full when a message is routed to it gets evicted.
    pub outbound_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The lifecycle state of one connection.
///
/// ```text
/// Connecting → Registered → RoomAssigned ⇄ RoomAssigned → Unregistering → Closed
///                  │                                           ↑
///                  └───────────────────────────────────────────┘
/// ```
///
/// - **Connecting**: the transport accepted the connection; the hub does
///   not know it yet.
/// - **Registered**: in the hub's live set, not in any room.
/// - **RoomAssigned**: member of exactly one room. Joining another room
///   stays in this state.
/// - **Unregistering**: transport closed, read/write failed, or the hub
///   evicted it. Nothing new is routed to it.
/// - **Closed**: terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Registered,
    RoomAssigned,
    Unregistering,
    Closed,
}

impl ConnectionState {
    /// Returns `true` while the hub may route messages to the connection.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Registered | Self::RoomAssigned)
    }

    /// Returns `true` once no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if moving from `self` to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Connecting, Registered)
                | (Connecting, Closed)
                | (Registered, RoomAssigned)
                | (Registered, Unregistering)
                | (RoomAssigned, RoomAssigned)
                | (RoomAssigned, Unregistering)
                | (Unregistering, Closed)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Registered => write!(f, "Registered"),
            Self::RoomAssigned => write!(f, "RoomAssigned"),
            Self::Unregistering => write!(f, "Unregistering"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

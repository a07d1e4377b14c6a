//! Peer records: who a connection is and what the hub knows about it.

use teletype_protocol::Message;
use teletype_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::hub::PeerInfo;
use crate::ConnectionState;

/// The identity a connection speaks with.
///
/// `identity` comes from the transport (the remote address) and never
/// changes. `display_name` is set by a NAME message and, when present,
/// replaces `identity` on everything the connection sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    identity: String,
    display_name: Option<String>,
}

impl Identity {
    /// Creates an identity with no display name.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: None,
        }
    }

    /// The transport-derived identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The display name, if one was set.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// The name stamped on outgoing messages.
    pub fn trusted_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.identity)
    }

    /// Sets the display name and returns the previous trusted name.
    pub fn rename(&mut self, name: impl Into<String>) -> String {
        let previous = self.trusted_name().to_string();
        self.display_name = Some(name.into());
        previous
    }
}

/// A registered connection as the hub sees it.
pub(crate) struct Peer {
    pub(crate) identity: Identity,
    pub(crate) room: Option<String>,
    pub(crate) state: ConnectionState,
    /// Sole producer side of the connection's outbound queue. Dropping
    /// it closes the queue and stops the writer.
    pub(crate) outbound: mpsc::Sender<Message>,
}

impl Peer {
    pub(crate) fn new(identity: String, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            identity: Identity::new(identity),
            room: None,
            state: ConnectionState::Registered,
            outbound,
        }
    }

    pub(crate) fn info(&self, id: ConnectionId) -> PeerInfo {
        PeerInfo {
            id,
            identity: self.identity.identity().to_string(),
            display_name: self.identity.display_name().map(str::to_string),
            room: self.room.clone(),
            state: self.state,
        }
    }
}

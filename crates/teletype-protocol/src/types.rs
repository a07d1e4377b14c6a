//! Message types for Teletype's wire format.
//!
//! Every frame on the wire is one JSON object:
//!
//! ```json
//! {"type":"CHAT","content":"hi","sender":"127.0.0.1:5000","room":"general","timestamp":"2024-05-01T12:00:00Z"}
//! ```
//!
//! Only `type` is required. Empty strings and a missing timestamp are
//! omitted when encoding, and default to empty when decoding.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender name used on messages the server itself produces.
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// What a message means.
///
/// The wire names are upper-case; [`MessageKind::SetName`] travels as
/// `"NAME"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    /// Ordinary chat text, broadcast to the sender's room.
    Chat,
    /// Server announcement (joins, renames).
    System,
    /// Client request to enter the room named in `content`.
    Join,
    /// Reserved. Accepted from clients but never routed.
    Leave,
    /// Client request to change its display name to `content`.
    #[serde(rename = "NAME")]
    SetName,
    /// Reserved. Accepted from clients but never routed.
    Error,
}

impl MessageKind {
    /// Returns the name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "CHAT",
            Self::System => "SYSTEM",
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
            Self::SetName => "NAME",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message exchanged between peers and the server.
///
/// `sender`, `room` and `timestamp` are advisory when they arrive from a
/// client; the server overwrites them before the message goes anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The message kind, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Text payload. For `JOIN` it is the room, for `NAME` the new name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    /// Display identity of the author.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,

    /// Target room. Empty means "the sender's current room" on the way
    /// in, and "every connection" when the server routes it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room: String,

    /// When the server accepted the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates an empty message of the given kind.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            content: String::new(),
            sender: String::new(),
            room: String::new(),
            timestamp: None,
        }
    }

    /// Creates a chat message stamped with the current time.
    pub fn chat(
        sender: impl Into<String>,
        content: impl Into<String>,
        room: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Chat,
            content: content.into(),
            sender: sender.into(),
            room: room.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Creates a server announcement with no room (a global broadcast
    /// until [`in_room`](Self::in_room) narrows it).
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            content: content.into(),
            sender: SYSTEM_SENDER.to_string(),
            room: String::new(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Sets the target room.
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    /// Overwrites the sender and timestamp with server-trusted values.
    pub fn stamp(&mut self, sender: &str, at: DateTime<Utc>) {
        self.sender.clear();
        self.sender.push_str(sender);
        self.timestamp = Some(at);
    }

    /// Returns `true` if the message targets every connection.
    pub fn is_global(&self) -> bool {
        self.room.is_empty()
    }
}

//! Connection registry for Teletype.
//!
//! The hub runs as one Tokio task (actor model) that owns every live
//! connection, the room index and each connection's outbound queue.
//! Connection tasks talk to it only through a [`HubHandle`].
//!
//! # Key types
//!
//! - [`HubHandle`]: send register/unregister/join/route commands
//! - [`RoomIndex`]: room name → member set, pruned when a room empties
//! - [`ConnectionState`]: per-connection lifecycle state machine
//! - [`Identity`]: transport-derived identity plus optional display name
//! - [`HubSnapshot`]: read-only copy of hub state for observers

mod config;
mod error;
mod hub;
mod index;
mod peer;

pub use config::{ConnectionState, HubConfig};
pub use error::HubError;
pub use hub::{spawn_hub, HubHandle, HubSnapshot, Outbound, PeerInfo};
pub use index::RoomIndex;
pub use peer::Identity;

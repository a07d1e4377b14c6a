//! # Teletype
//!
//! Room-based real-time chat router over WebSocket.
//!
//! Clients connect, `JOIN` a room and exchange `CHAT` messages with the
//! other members of that room. The server stamps every message with the
//! sender's trusted identity, announces joins and renames, and drops
//! connections that can't keep up instead of letting them slow down
//! everyone else.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use teletype::prelude::*;
//!
//! # async fn start() -> Result<(), TeletypeError> {
//! let config = ServerConfig::from_env()?;
//! let server = TeletypeServer::builder().config(config).build().await?;
//! server.run().await
//! # }
//! ```

pub mod config;
mod error;
mod logging;
pub mod pump;
mod server;

pub use config::{ConfigError, PumpConfig, ServerConfig};
pub use error::TeletypeError;
pub use logging::init_tracing;
pub use server::{TeletypeServer, TeletypeServerBuilder};

/// Re-exports of the sub-crates, for users who need the lower layers.
pub use teletype_hub as hub;
pub use teletype_protocol as protocol;
pub use teletype_transport as transport;

/// Common imports for running a server.
pub mod prelude {
    pub use crate::{
        init_tracing, ConfigError, PumpConfig, ServerConfig, TeletypeError,
        TeletypeServer, TeletypeServerBuilder,
    };
    pub use teletype_hub::{HubHandle, HubSnapshot};
    pub use teletype_protocol::{Message, MessageKind};
}

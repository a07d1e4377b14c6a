//! Wire protocol for Teletype.
//!
//! This crate defines what clients and the server exchange:
//!
//! - **Types** ([`Message`], [`MessageKind`]): the JSON objects that
//!   travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Hub (rooms, fan-out)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Message, MessageKind, SYSTEM_SENDER};

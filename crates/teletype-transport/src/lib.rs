//! Transport abstraction layer for Teletype.
//!
//! Provides the [`Transport`], [`Incoming`] and [`Connection`] traits that
//! abstract over message-framed, full-duplex network protocols. The routing core only
//! ever talks to these traits, so tests can drive it with in-memory
//! connections.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingWebSocket, WebSocketConnection, WebSocketSettings, WebSocketTransport,
};

use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
///
/// `accept` only takes the raw connection off the listener. The protocol
/// handshake happens later in [`Incoming::handshake`], so a client that
/// never finishes it cannot hold up the accept loop.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// An accepted connection still waiting for its handshake.
    type Incoming: Incoming<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// An accepted connection that has not completed its opening handshake.
pub trait Incoming: Send + 'static {
    /// The connection produced by a successful handshake.
    type Connection: Connection;
    /// The error type for a failed handshake.
    type Error: std::error::Error + Send + Sync;

    /// Returns the address of the remote peer.
    fn remote_addr(&self) -> SocketAddr;

    /// Runs the handshake, bounded by the transport's handshake deadline.
    fn handshake(self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// A single message-framed connection.
///
/// Implementations must allow `send`/`ping`/`close` to run concurrently
/// with a pending `recv`: the reader and writer pumps share one
/// connection and neither may wait on the other.
///
/// The returned futures are `Send` so a pump can be spawned for any
/// implementation. Implementors can still write these as `async fn`.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one message to the remote peer.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Sends a transport-level liveness ping.
    fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Closes the connection, telling the peer why.
    fn close(&self, reason: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the address of the remote peer.
    fn remote_addr(&self) -> SocketAddr;
}

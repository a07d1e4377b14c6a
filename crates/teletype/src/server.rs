//! `TeletypeServer` builder and accept loop.
//!
//! The server ties the layers together: the WebSocket transport accepts
//! connections, the hub owns routing state, and every connection gets a
//! pump pair wired to both.

use std::net::SocketAddr;

use teletype_hub::{spawn_hub, HubHandle};
use teletype_protocol::JsonCodec;
use teletype_transport::{
    Connection, Incoming, PendingWebSocket, Transport, TransportError, WebSocketTransport,
};
use tokio_util::sync::CancellationToken;

use crate::config::{PumpConfig, ServerConfig};
use crate::pump::serve_connection;
use crate::TeletypeError;

/// Builder for configuring and starting a Teletype server.
///
/// # Example
///
/// ```rust,no_run
/// use teletype::prelude::*;
///
/// # async fn start() -> Result<(), TeletypeError> {
/// let server = TeletypeServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TeletypeServerBuilder {
    config: ServerConfig,
}

impl TeletypeServerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration, binds the listener and starts the hub.
    pub async fn build(self) -> Result<TeletypeServer, TeletypeError> {
        self.config.validate()?;

        let transport = WebSocketTransport::bind_with(
            &self.config.bind_addr,
            self.config.websocket_settings(),
        )
        .await?;
        let hub = spawn_hub(self.config.hub_config());

        Ok(TeletypeServer {
            transport,
            hub,
            config: self.config,
            shutdown: CancellationToken::new(),
        })
    }
}

/// A bound Teletype server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct TeletypeServer {
    transport: WebSocketTransport,
    hub: HubHandle,
    config: ServerConfig,
    shutdown: CancellationToken,
}

impl TeletypeServer {
    /// Creates a new builder.
    pub fn builder() -> TeletypeServerBuilder {
        TeletypeServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns a handle to the hub, e.g. for taking snapshots.
    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Returns the token that stops the server. Cancelling it stops the
    /// accept loop and closes every open connection.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the accept loop until the shutdown token is cancelled.
    ///
    /// Each accepted connection is served on its own task, which also runs
    /// the WebSocket handshake, so a client that stalls mid-handshake never
    /// holds up the next accept. Failed accepts and handshakes are logged
    /// and skipped.
    pub async fn run(mut self) -> Result<(), TeletypeError> {
        let addr = self
            .transport
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(%addr, "teletype server running");

        let pump_config = self.config.pump_config();

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.transport.accept() => accepted,
            };

            match accepted {
                Ok(incoming) => {
                    tokio::spawn(handle_incoming(
                        incoming,
                        self.hub.clone(),
                        pump_config.clone(),
                        self.shutdown.clone(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }

        tracing::info!("teletype server shutting down");
        self.transport.shutdown().await?;
        Ok(())
    }
}

/// Completes the handshake for one accepted connection, then serves it.
async fn handle_incoming(
    incoming: PendingWebSocket,
    hub: HubHandle,
    config: PumpConfig,
    shutdown: CancellationToken,
) {
    let addr = incoming.remote_addr();
    let handshake = tokio::select! {
        _ = shutdown.cancelled() => return,
        handshake = incoming.handshake() => handshake,
    };
    let conn = match handshake {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(%addr, error = %e, "handshake failed");
            return;
        }
    };

    let id = conn.id();
    match serve_connection(conn, hub, JsonCodec, config, shutdown).await {
        Ok(()) => tracing::info!(%id, "connection closed"),
        Err(TeletypeError::Transport(e)) if e.is_protocol_violation() => {
            tracing::warn!(%id, error = %e, "peer broke framing rules");
        }
        Err(e) => tracing::info!(%id, error = %e, "connection ended"),
    }
}

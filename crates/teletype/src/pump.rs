//! Per-connection pumps.
//!
//! Every accepted connection gets a reader and a writer:
//!
//! - the **reader** runs on the connection task. It decodes inbound
//!   frames, stamps them with the connection's trusted identity and turns
//!   them into hub commands.
//! - the **writer** is a spawned task. It is the only consumer of the
//!   connection's outbound queue and the only code that writes to the
//!   transport.
//!
//! The two share the connection and a cancellation token. Whichever side
//! stops first brings the other one down, and the connection is
//! unregistered from the hub exactly once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use teletype_hub::{ConnectionState, HubError, HubHandle, Identity, Outbound};
use teletype_protocol::{Codec, Message, MessageKind};
use teletype_transport::{Connection, ConnectionId, TransportError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::PumpConfig;
use crate::TeletypeError;

/// Serves one connection until it closes, fails, is evicted or the
/// server shuts down.
///
/// Registers the connection with the hub, spawns its writer and runs the
/// reader on the current task. Returns the first error either side hit;
/// a clean close or a shutdown is `Ok(())`. A writer that panics is
/// reported as [`TeletypeError::WriterFailed`].
pub async fn serve_connection<C, K>(
    conn: C,
    hub: HubHandle,
    codec: K,
    config: PumpConfig,
    shutdown: CancellationToken,
) -> Result<(), TeletypeError>
where
    C: Connection<Error = TransportError>,
    K: Codec + Clone,
{
    let conn = Arc::new(conn);
    let id = conn.id();
    let identity = conn.remote_addr().to_string();

    let mut mirror = PeerMirror::new(id, identity.clone());
    let outbound = hub.register(id, identity)?;
    let registration = Registration::new(id, hub.clone());
    mirror.transition(ConnectionState::Registered);
    tracing::debug!(%id, identity = mirror.identity.identity(), "connection registered");

    let cancel = shutdown.child_token();
    let writer = tokio::spawn(run_writer(
        Arc::clone(&conn),
        codec.clone(),
        outbound,
        config.clone(),
        cancel.clone(),
    ));

    let read_result =
        run_reader(conn.as_ref(), &hub, &codec, &config, &mut mirror, &cancel).await;

    mirror.transition(ConnectionState::Unregistering);
    drop(registration);
    mirror.transition(ConnectionState::Closed);

    let write_result = writer.await.unwrap_or_else(|e| {
        tracing::error!(%id, error = %e, "writer task failed");
        Err(TeletypeError::WriterFailed(e))
    });

    read_result.and(write_result)
}

// ---------------------------------------------------------------------------
// Registration guard
// ---------------------------------------------------------------------------

/// Unregisters a connection from the hub when dropped, including when the
/// connection task unwinds.
struct Registration {
    id: ConnectionId,
    hub: HubHandle,
}

impl Registration {
    fn new(id: ConnectionId, hub: HubHandle) -> Self {
        Self { id, hub }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.hub.unregister(self.id).is_err() {
            tracing::debug!(id = %self.id, "hub already stopped; nothing to unregister");
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

async fn run_reader<C, K>(
    conn: &C,
    hub: &HubHandle,
    codec: &K,
    config: &PumpConfig,
    mirror: &mut PeerMirror,
    cancel: &CancellationToken,
) -> Result<(), TeletypeError>
where
    C: Connection<Error = TransportError>,
    K: Codec,
{
    let id = mirror.id;
    loop {
        let data = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(%id, "reader cancelled");
                return Ok(());
            }
            received = conn.recv() => match received? {
                Some(data) => data,
                None => {
                    tracing::debug!(%id, "connection closed by peer");
                    return Ok(());
                }
            },
        };

        if data.len() > config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: data.len(),
                limit: config.max_message_size,
            }
            .into());
        }

        let message: Message = codec.decode(&data)?;
        mirror.dispatch(message, hub, Utc::now())?;
    }
}

/// The connection's own view of its identity, room and lifecycle state.
///
/// The hub owns membership; this copy exists so the reader can stamp and
/// scope messages without asking the hub.
struct PeerMirror {
    id: ConnectionId,
    identity: Identity,
    room: Option<String>,
    state: ConnectionState,
}

impl PeerMirror {
    fn new(id: ConnectionId, identity: String) -> Self {
        Self {
            id,
            identity: Identity::new(identity),
            room: None,
            state: ConnectionState::Connecting,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            tracing::debug!(id = %self.id, from = %self.state, to = %next, "ignoring state change");
        }
    }

    /// Applies one inbound message.
    fn dispatch(
        &mut self,
        mut message: Message,
        hub: &HubHandle,
        now: DateTime<Utc>,
    ) -> Result<(), HubError> {
        message.stamp(self.identity.trusted_name(), now);

        match message.kind {
            MessageKind::Join => self.join(message.content, hub),
            MessageKind::SetName => self.rename(message.content, hub),
            _ => self.forward(message, hub),
        }
    }

    fn join(&mut self, room: String, hub: &HubHandle) -> Result<(), HubError> {
        if room.is_empty() {
            tracing::debug!(id = %self.id, "JOIN without a room ignored");
            return Ok(());
        }

        hub.join_room(self.id, room.as_str())?;
        self.transition(ConnectionState::RoomAssigned);

        let announcement = Message::system(format!(
            "{} joined room {}",
            self.identity.trusted_name(),
            room
        ))
        .in_room(room.as_str());
        self.room = Some(room);
        // Routed as this peer so the hub drops it if the join was refused.
        hub.route_from(self.id, announcement)
    }

    fn rename(&mut self, name: String, hub: &HubHandle) -> Result<(), HubError> {
        if name.is_empty() {
            tracing::debug!(id = %self.id, "NAME without a name ignored");
            return Ok(());
        }

        let previous = self.identity.rename(name.as_str());
        hub.set_name(self.id, name.as_str())?;

        match &self.room {
            Some(room) => hub.route_from(
                self.id,
                Message::system(format!("{previous} changed name to {name}"))
                    .in_room(room.as_str()),
            ),
            None => Ok(()),
        }
    }

    fn forward(&self, mut message: Message, hub: &HubHandle) -> Result<(), HubError> {
        message.room = self.room.clone().unwrap_or_default();

        match message.kind {
            MessageKind::Chat if message.room.is_empty() => {
                tracing::debug!(id = %self.id, "CHAT before JOIN dropped");
                Ok(())
            }
            MessageKind::Chat => hub.route_from(self.id, message),
            kind => {
                tracing::trace!(id = %self.id, %kind, "client message not routed");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

async fn run_writer<C, K>(
    conn: Arc<C>,
    codec: K,
    mut outbound: Outbound,
    config: PumpConfig,
    cancel: CancellationToken,
) -> Result<(), TeletypeError>
where
    C: Connection<Error = TransportError>,
    K: Codec,
{
    // Stops the reader however the writer exits.
    let _stop_reader = cancel.clone().drop_guard();
    let id = conn.id();

    let mut keepalive = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Shutdown wins over the queue closing that it causes.
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(%id, "writer cancelled");
                if let Err(e) =
                    with_deadline(config.write_timeout, "close", conn.close("server shutting down")).await
                {
                    tracing::debug!(%id, error = %e, "close on shutdown failed");
                }
                return Ok(());
            }
            queued = outbound.recv() => match queued {
                Some(message) => {
                    let bytes = codec.encode(&message)?;
                    with_deadline(config.write_timeout, "send", conn.send(&bytes)).await?;
                }
                None => {
                    tracing::debug!(%id, "outbound queue closed; closing connection");
                    return with_deadline(config.write_timeout, "close", conn.close("connection closed")).await;
                }
            },
            _ = keepalive.tick() => {
                with_deadline(config.write_timeout, "ping", conn.ping()).await?;
            }
        }
    }
}

async fn with_deadline<F>(
    deadline: Duration,
    operation: &'static str,
    write: F,
) -> Result<(), TeletypeError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    match tokio::time::timeout(deadline, write).await {
        Ok(result) => result.map_err(TeletypeError::from),
        Err(_) => Err(TeletypeError::WriteTimeout(operation)),
    }
}

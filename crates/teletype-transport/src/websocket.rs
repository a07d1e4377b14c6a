//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::{Connection, ConnectionId, Incoming, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// Limits applied to every accepted WebSocket connection.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Largest inbound message (and frame) in bytes.
    pub max_message_size: usize,

    /// How long a connection may stay silent (no data, no pong) before
    /// `recv` fails.
    pub idle_timeout: Duration,

    /// Deadline for the opening HTTP upgrade.
    pub handshake_timeout: Duration,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            max_message_size: 512,
            idle_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl WebSocketSettings {
    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    settings: WebSocketSettings,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport with default settings.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, WebSocketSettings::default()).await
    }

    /// Binds a new WebSocket transport to the given address.
    pub async fn bind_with(
        addr: &str,
        settings: WebSocketSettings,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(
            addr,
            max_message_size = settings.max_message_size,
            "WebSocket transport listening"
        );
        Ok(Self { listener, settings })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Incoming = PendingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error> {
        let (stream, remote_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::trace!(%remote_addr, "accepted TCP connection");

        Ok(PendingWebSocket {
            stream,
            remote_addr,
            settings: self.settings.clone(),
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// A TCP connection waiting for its WebSocket upgrade.
pub struct PendingWebSocket {
    stream: TcpStream,
    remote_addr: SocketAddr,
    settings: WebSocketSettings,
}

impl Incoming for PendingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    async fn handshake(self) -> Result<Self::Connection, Self::Error> {
        let Self {
            stream,
            remote_addr,
            settings,
        } = self;

        let ws = tokio::time::timeout(
            settings.handshake_timeout,
            tokio_tungstenite::accept_async_with_config(stream, Some(settings.ws_config())),
        )
        .await
        .map_err(|_| TransportError::Timeout("websocket handshake"))?
        .map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %remote_addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            remote_addr,
            max_message_size: settings.max_message_size,
            idle_timeout: settings.idle_timeout,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single WebSocket connection.
///
/// The write and read halves sit behind separate locks so a pending
/// `recv` never blocks `send`, `ping` or `close`.
pub struct WebSocketConnection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    max_message_size: usize,
    idle_timeout: Duration,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    async fn write(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                TransportError::ConnectionClosed(e.to_string())
            }
            e => TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            )),
        })
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Browsers expect JSON as text frames.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.write(msg).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            let next =
                tokio::time::timeout(self.idle_timeout, stream.next())
                    .await
                    .map_err(|_| TransportError::Timeout("idle read"))?;
            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Pings are answered by tungstenite; pongs only refresh
                // the idle deadline.
                Some(Ok(_)) => continue,
                Some(Err(WsError::Capacity(
                    CapacityError::MessageTooLong { size, .. },
                ))) => {
                    return Err(TransportError::MessageTooLarge {
                        size,
                        limit: self.max_message_size,
                    });
                }
                Some(Err(
                    WsError::ConnectionClosed | WsError::AlreadyClosed,
                )) => return Ok(None),
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.write(Message::Ping(Vec::new().into())).await
    }

    async fn close(&self, reason: &str) -> Result<(), Self::Error> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_owned().into(),
        };
        match self.sink.lock().await.send(Message::Close(Some(frame))).await {
            Ok(()) => Ok(()),
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

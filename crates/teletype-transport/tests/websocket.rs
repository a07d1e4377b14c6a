//! Integration tests for the WebSocket transport.
//!
//! These tests spin up a real WebSocket listener on an ephemeral port and
//! talk to it with a `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use teletype_transport::{
        Connection, Incoming, Transport, TransportError, WebSocketConnection,
        WebSocketSettings, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds a transport on a random port, connects one client and
    /// returns both ends.
    async fn connected_pair(
        settings: WebSocketSettings,
    ) -> (WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind_with("127.0.0.1:0", settings)
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");

        let server_handle = tokio::spawn(async move {
            let incoming = transport.accept().await.expect("should accept");
            incoming.handshake().await.expect("handshake should succeed")
        });

        let (client_ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .expect("client should connect");
        let server_conn = server_handle.await.expect("task should complete");
        (server_conn, client_ws)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (server_conn, mut client_ws) =
            connected_pair(WebSocketSettings::default()).await;

        assert!(server_conn.id().into_inner() > 0);
        assert!(server_conn.remote_addr().ip().is_loopback());

        // Server sends, client receives a text frame.
        server_conn
            .send(br#"{"type":"SYSTEM"}"#)
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_data().as_ref(), br#"{"type":"SYSTEM"}"#);

        // Client sends, server receives.
        client_ws
            .send(Message::Text("hello from client".into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");
    }

    #[tokio::test]
    async fn test_websocket_send_does_not_wait_for_pending_recv() {
        let (server_conn, mut client_ws) =
            connected_pair(WebSocketSettings::default()).await;
        let server_conn = std::sync::Arc::new(server_conn);

        let reader = {
            let conn = std::sync::Arc::clone(&server_conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), server_conn.send(b"ping"))
            .await
            .expect("send must not block on the reader")
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"ping");

        client_ws.send(Message::Close(None)).await.unwrap();
        let result = reader.await.unwrap().expect("recv should not error");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (server_conn, mut client_ws) =
            connected_pair(WebSocketSettings::default()).await;

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_recv_rejects_oversized_message() {
        let settings = WebSocketSettings {
            max_message_size: 64,
            ..WebSocketSettings::default()
        };
        let (server_conn, mut client_ws) = connected_pair(settings).await;

        client_ws
            .send(Message::Text("x".repeat(200).into()))
            .await
            .unwrap();

        let err = server_conn.recv().await.expect_err("should reject");
        assert!(
            matches!(err, TransportError::MessageTooLarge { limit: 64, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_websocket_recv_times_out_when_idle() {
        let settings = WebSocketSettings {
            idle_timeout: Duration::from_millis(100),
            ..WebSocketSettings::default()
        };
        let (server_conn, _client_ws) = connected_pair(settings).await;

        let err = server_conn.recv().await.expect_err("should time out");
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_websocket_ping_reaches_client() {
        let (server_conn, mut client_ws) =
            connected_pair(WebSocketSettings::default()).await;

        server_conn.ping().await.expect("ping should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(matches!(msg, Message::Ping(_)));
    }

    #[tokio::test]
    async fn test_websocket_close_sends_reason() {
        let (server_conn, mut client_ws) =
            connected_pair(WebSocketSettings::default()).await;

        server_conn.close("bye").await.expect("close should succeed");

        match client_ws.next().await.unwrap().unwrap() {
            Message::Close(Some(frame)) => assert_eq!(frame.reason.as_str(), "bye"),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_handshake_times_out_for_silent_client() {
        let settings = WebSocketSettings {
            handshake_timeout: Duration::from_millis(100),
            ..WebSocketSettings::default()
        };
        let mut transport = WebSocketTransport::bind_with("127.0.0.1:0", settings)
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");

        // Connects over TCP but never sends the HTTP upgrade.
        let silent = tokio::net::TcpStream::connect(addr).await.unwrap();
        let incoming = transport.accept().await.expect("TCP accept should succeed");
        assert_eq!(incoming.remote_addr(), silent.local_addr().unwrap());

        let result = incoming.handshake().await;
        assert!(matches!(
            result,
            Err(TransportError::Timeout("websocket handshake"))
        ));
    }

    #[tokio::test]
    async fn test_websocket_accept_does_not_wait_for_handshake() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");

        let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();
        let stalled = transport.accept().await.expect("should accept silent client");

        let client = tokio::spawn(tokio_tungstenite::connect_async(format!("ws://{addr}")));
        let incoming = tokio::time::timeout(Duration::from_secs(2), transport.accept())
            .await
            .expect("second accept should not wait on the first handshake")
            .expect("should accept");
        let conn = incoming.handshake().await.expect("handshake should succeed");
        client.await.unwrap().expect("client should connect");

        assert!(conn.remote_addr().ip().is_loopback());
        drop(stalled);
    }
}

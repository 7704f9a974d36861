//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use codesync_transport::{Connection, Transport, WebSocketTransport};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_client(addr: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    /// Binds on port 0, connects one client, and returns both ends.
    async fn pair() -> (codesync_transport::WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let client = connect_client(&addr).await;
        let server_conn = server_handle.await.expect("task should complete");
        (server_conn, client)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (server_conn, mut client_ws) = pair().await;
        assert!(server_conn.id().into_inner() > 0);

        server_conn
            .send(br#"{"hello":"from server"}"#)
            .await
            .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "UTF-8 payloads go out as text frames");
        assert_eq!(msg.into_data().as_ref(), br#"{"hello":"from server"}"#);

        client_ws
            .send(Message::Binary(b"hello from client".to_vec().into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_text_frames_are_received_as_bytes() {
        let (server_conn, mut client_ws) = pair().await;

        client_ws
            .send(Message::Text("plain text".to_owned().into()))
            .await
            .unwrap();

        let received = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(received, b"plain text");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (server_conn, mut client_ws) = pair().await;

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_is_pending() {
        // A handler waits in recv() for most of its life; writes from
        // other tasks must still go through.
        let (server_conn, mut client_ws) = pair().await;
        let server_conn = Arc::new(server_conn);

        let reader = Arc::clone(&server_conn);
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(
            Duration::from_secs(2),
            server_conn.send(b"while waiting"),
        )
        .await
        .expect("send must not wait on the reader")
        .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"while waiting");

        client_ws.send(Message::Close(None)).await.unwrap();
        let closed = pending.await.unwrap().unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_websocket_ping_reaches_peer_and_replies_reset_idle() {
        let (server_conn, mut client_ws) = pair().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(server_conn.idle_for() >= Duration::from_millis(100));

        server_conn.ping().await.expect("ping should send");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_ping(), "expected a Ping frame, got {msg:?}");

        // The queued Pong is flushed ahead of this frame.
        client_ws
            .send(Message::Text("still here".to_owned().into()))
            .await
            .unwrap();
        let received = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(received, b"still here");
        assert!(server_conn.idle_for() < Duration::from_millis(100));
    }
}

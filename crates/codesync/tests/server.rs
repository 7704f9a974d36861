//! Integration tests for the CodeSync server over real WebSocket clients.

use std::time::Duration;

use codesync::GatewayHandle;
use codesync::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Test executor
// =========================================================================

/// Reports the language and source instead of running anything.
struct EchoExecutor;

impl Executor for EchoExecutor {
    async fn execute(&self, language: LanguageTag, source: String) -> ExecutionResult {
        ExecutionResult {
            outputs: vec![OutputLine::log(format!("{language}: {source}"))],
            success: true,
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns the address and gateway.
async fn start_server() -> (String, GatewayHandle) {
    start_server_with(CodesyncServerBuilder::new()).await
}

async fn start_server_with(builder: CodesyncServerBuilder) -> (String, GatewayHandle) {
    let server = builder
        .bind("127.0.0.1:0")
        .build(EchoExecutor)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let gateway = server.gateway();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, gateway)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, payload: ClientMessage) {
    let envelope = Envelope::new(0, 0, payload);
    let text = serde_json::to_string(&envelope).expect("encode");
    ws.send(Message::Text(text.into())).await.expect("send");
}

/// Reads the next application frame. Reading also answers server Pings.
async fn recv_envelope(ws: &mut ClientWs) -> Envelope<ServerMessage> {
    let msg = loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for server message")
            .expect("stream ended")
            .expect("ws error");
        if !(msg.is_ping() || msg.is_pong()) {
            break msg;
        }
    };
    assert!(msg.is_text(), "server frames are text, got {msg:?}");
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

async fn recv(ws: &mut ClientWs) -> ServerMessage {
    recv_envelope(ws).await.payload
}

/// Connects and joins `room`, returning the client and its `roomState`.
async fn join(addr: &str, room: &str, name: &str) -> (ClientWs, ServerMessage) {
    let mut ws = connect(addr).await;
    send(
        &mut ws,
        ClientMessage::Join {
            room_id: RoomId::from(room),
            display_id: Some(name.into()),
        },
    )
    .await;
    let state = recv(&mut ws).await;
    (ws, state)
}

/// Sends a heartbeat and asserts the very next message is its ack, which
/// proves nothing else was queued for this client in between.
async fn assert_nothing_pending(ws: &mut ClientWs) {
    send(ws, ClientMessage::Heartbeat { client_time: 777 }).await;
    match recv(ws).await {
        ServerMessage::HeartbeatAck { client_time, .. } => assert_eq!(client_time, 777),
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

async fn wait_for_connections(gateway: &GatewayHandle, expected: usize) {
    for _ in 0..100 {
        if gateway.stats().await.expect("stats").connections == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("gateway never reached {expected} connections");
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_join_unseen_room_gets_default_template() {
    let (addr, _gw) = start_server().await;
    let (_ws, state) = join(&addr, "fresh-room", "alice").await;

    match state {
        ServerMessage::RoomState {
            room_id,
            buffer,
            language,
            member_count,
        } => {
            assert_eq!(room_id, RoomId::from("fresh-room"));
            assert!(buffer.contains("console.log(\"Hello, World!\")"));
            assert_eq!(language, LanguageTag::JavaScript);
            assert_eq!(member_count, 1);
        }
        other => panic!("expected RoomState, got {other:?}"),
    }
}

#[tokio::test]
async fn test_edit_reaches_others_and_is_not_echoed() {
    let (addr, _gw) = start_server().await;
    let (mut a, _) = join(&addr, "r1", "A").await;
    let (mut b, _) = join(&addr, "r1", "B").await;

    assert_eq!(
        recv(&mut a).await,
        ServerMessage::MemberJoined {
            display_id: "B".into(),
            member_count: 2,
        }
    );

    send(
        &mut a,
        ClientMessage::BufferEdit {
            room_id: RoomId::from("r1"),
            buffer: "x=1".into(),
            language: None,
        },
    )
    .await;

    assert_eq!(
        recv(&mut b).await,
        ServerMessage::BufferUpdated {
            buffer: "x=1".into(),
            language: None,
            origin: "A".into(),
        }
    );
    assert_nothing_pending(&mut a).await;
}

#[tokio::test]
async fn test_abrupt_disconnect_notifies_remaining_members() {
    let (addr, gw) = start_server().await;
    let (mut a, _) = join(&addr, "r1", "A").await;
    let (b, _) = join(&addr, "r1", "B").await;
    recv(&mut a).await; // memberJoined

    drop(b);

    assert_eq!(
        recv(&mut a).await,
        ServerMessage::MemberLeft {
            display_id: "B".into(),
            member_count: 1,
        }
    );
    wait_for_connections(&gw, 1).await;
}

#[tokio::test]
async fn test_rejoin_after_everyone_left_keeps_buffer() {
    let (addr, gw) = start_server().await;
    let (mut a, _) = join(&addr, "keep", "A").await;
    send(
        &mut a,
        ClientMessage::BufferEdit {
            room_id: RoomId::from("keep"),
            buffer: "print('still here')".into(),
            language: Some(LanguageTag::Python),
        },
    )
    .await;
    assert_nothing_pending(&mut a).await;
    drop(a);
    wait_for_connections(&gw, 0).await;

    let (_a2, state) = join(&addr, "keep", "A").await;
    match state {
        ServerMessage::RoomState {
            buffer, language, ..
        } => {
            assert_eq!(buffer, "print('still here')");
            assert_eq!(language, LanguageTag::Python);
        }
        other => panic!("expected RoomState, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_connection_survives() {
    let (addr, _gw) = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text(r#"{"payload":{"type":"bufferEdit"}}"#.to_owned().into()))
        .await
        .unwrap();
    match recv(&mut ws).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error, got {other:?}"),
    }

    assert_nothing_pending(&mut ws).await;
}

#[tokio::test]
async fn test_empty_room_id_is_rejected() {
    let (addr, gw) = start_server().await;
    let (mut ws, reply) = join(&addr, "", "A").await;

    assert_eq!(
        reply,
        ServerMessage::error(400, "invalid message: roomId must not be empty")
    );
    assert_nothing_pending(&mut ws).await;
    assert_eq!(gw.stats().await.unwrap().rooms, 0);
}

#[tokio::test]
async fn test_cursor_updates_use_unreliable_channel() {
    let (addr, _gw) = start_server().await;
    let (mut a, _) = join(&addr, "r1", "A").await;
    let (mut b, _) = join(&addr, "r1", "B").await;
    recv(&mut a).await; // memberJoined

    let position = CursorPosition {
        line_number: 4,
        column: 2,
    };
    send(
        &mut b,
        ClientMessage::CursorMove {
            room_id: RoomId::from("r1"),
            position,
        },
    )
    .await;

    let envelope = recv_envelope(&mut a).await;
    assert_eq!(envelope.channel, Channel::Unreliable);
    assert_eq!(
        envelope.payload,
        ServerMessage::CursorUpdated {
            origin: "B".into(),
            position,
        }
    );
}

#[tokio::test]
async fn test_execute_returns_output_to_requester_only() {
    let (addr, _gw) = start_server().await;
    let (mut a, _) = join(&addr, "r1", "A").await;
    let (mut b, _) = join(&addr, "r1", "B").await;
    recv(&mut a).await; // memberJoined

    send(
        &mut b,
        ClientMessage::Execute {
            room_id: RoomId::from("r1"),
        },
    )
    .await;

    match recv(&mut b).await {
        ServerMessage::ExecutionResult { outputs, success } => {
            assert!(success);
            assert_eq!(outputs.len(), 1);
            assert!(outputs[0].content.starts_with("javascript: // Welcome to CodeSync!"));
        }
        other => panic!("expected ExecutionResult, got {other:?}"),
    }
    assert_nothing_pending(&mut a).await;
}

#[tokio::test]
async fn test_outbound_sequence_numbers_increase() {
    let (addr, _gw) = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, ClientMessage::Heartbeat { client_time: 1 }).await;
    send(&mut ws, ClientMessage::Heartbeat { client_time: 2 }).await;
    let first = recv_envelope(&mut ws).await;
    let second = recv_envelope(&mut ws).await;

    assert!(second.seq > first.seq);
    assert!(matches!(
        first.payload,
        ServerMessage::HeartbeatAck { client_time: 1, .. }
    ));
}

// =========================================================================
// Liveness
// =========================================================================

fn fast_pings() -> CodesyncServerBuilder {
    CodesyncServerBuilder::new()
        .ping_interval(Duration::from_millis(100))
        .ping_timeout(Duration::from_millis(100))
}

#[tokio::test]
async fn test_silent_member_answering_pings_stays_in_room() {
    let (addr, gw) = start_server_with(fast_pings()).await;
    let (mut a, _) = join(&addr, "r1", "A").await;
    let (mut b, _) = join(&addr, "r1", "B").await;
    assert_eq!(
        recv(&mut a).await,
        ServerMessage::MemberJoined {
            display_id: "B".into(),
            member_count: 2,
        }
    );

    // B never sends another message; polling its stream answers Pings.
    let b_reader = tokio::spawn(async move { while let Some(Ok(_)) = b.next().await {} });

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_nothing_pending(&mut a).await;
    }
    assert!(!b_reader.is_finished(), "B's connection was closed");
    assert_eq!(gw.stats().await.unwrap().connections, 2);
}

#[tokio::test]
async fn test_peer_that_stops_answering_pings_is_dropped() {
    let (addr, gw) = start_server_with(fast_pings()).await;
    let (mut a, _) = join(&addr, "r1", "A").await;
    // Kept alive but never polled again, so Pings go unanswered.
    let (_b, _) = join(&addr, "r1", "B").await;
    recv(&mut a).await; // memberJoined

    assert_eq!(
        recv(&mut a).await,
        ServerMessage::MemberLeft {
            display_id: "B".into(),
            member_count: 1,
        }
    );
    wait_for_connections(&gw, 1).await;
}

//! Core protocol types for CodeSync's wire format.
//!
//! Everything here is serialized as JSON for the browser client. Message
//! enums are internally tagged (`{"type": "bufferEdit", ...}`) with
//! camelCase field names so they read naturally from TypeScript.

use std::fmt;

use codesync_transport::ConnectionId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque room key, taken verbatim from the client's URL.
///
/// Any non-empty string is a valid room id; rooms are created lazily the
/// first time someone joins one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The server accepts any string except the empty one.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one live connection's participant.
///
/// Derived from the transport's [`ConnectionId`], so it is regenerated on
/// every reconnect and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl From<ConnectionId> for ParticipantId {
    fn from(id: ConnectionId) -> Self {
        Self(id.into_inner())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Room content
// ---------------------------------------------------------------------------

/// How a room's buffer should be interpreted and executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageTag {
    #[default]
    JavaScript,
    Python,
    Html,
}

impl LanguageTag {
    /// Every supported language, in display order.
    pub const ALL: [LanguageTag; 3] = [Self::JavaScript, Self::Python, Self::Html];

    /// The wire name of the language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caret position inside the editor. Relayed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub line_number: u32,
    pub column: u32,
}

/// Classification of a line produced by running a buffer.
///
/// Process-based executors only see two pipes, so they emit `Log` for
/// stdout and `Error` for stderr. `Warn`, `Info` and `Result` are for
/// executors that can observe console calls or the value of the last
/// expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Log,
    Error,
    Warn,
    Info,
    Result,
}

/// One line of execution output, in the order it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub kind: OutputKind,
    pub content: String,
}

impl OutputLine {
    pub fn new(kind: OutputKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn log(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Log, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Error, content)
    }
}

// ---------------------------------------------------------------------------
// Channel: delivery guarantees
// ---------------------------------------------------------------------------

/// The delivery guarantee requested for a message.
///
/// Everything that changes room state is reliable and ordered. Cursor
/// updates are superseded by the next one, so they may be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    #[default]
    ReliableOrdered,
    ReliableUnordered,
    Unreliable,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages a participant sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Attach to a room, leaving any other room first.
    Join {
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_id: Option<String>,
    },

    /// Replace the room's buffer (and optionally its language).
    BufferEdit {
        room_id: RoomId,
        buffer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<LanguageTag>,
    },

    /// Tell the others the sender switched language.
    LanguageChange {
        room_id: RoomId,
        language: LanguageTag,
    },

    /// Share the sender's caret position.
    CursorMove {
        room_id: RoomId,
        position: CursorPosition,
    },

    /// Detach from a room.
    Leave { room_id: RoomId },

    /// Run the room's current buffer and send the output back to the
    /// sender only.
    Execute { room_id: RoomId },

    /// Health check. `client_time` is echoed back untouched.
    Heartbeat { client_time: u64 },
}

impl ClientMessage {
    /// The room the message addresses, if it addresses one.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::Join { room_id, .. }
            | Self::BufferEdit { room_id, .. }
            | Self::LanguageChange { room_id, .. }
            | Self::CursorMove { room_id, .. }
            | Self::Leave { room_id }
            | Self::Execute { room_id } => Some(room_id),
            Self::Heartbeat { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Messages the server sends to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full snapshot, sent to a participant right after it joins.
    RoomState {
        room_id: RoomId,
        buffer: String,
        language: LanguageTag,
        member_count: usize,
    },

    /// Someone else joined the room.
    MemberJoined {
        display_id: String,
        member_count: usize,
    },

    /// Someone else left the room (or dropped).
    MemberLeft {
        display_id: String,
        member_count: usize,
    },

    /// Another participant replaced the buffer. `origin` lets the client
    /// recognise edits it did not make.
    BufferUpdated {
        buffer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<LanguageTag>,
        origin: String,
    },

    /// Another participant switched language.
    LanguageUpdated { language: LanguageTag, origin: String },

    /// Another participant moved their caret.
    CursorUpdated {
        origin: String,
        position: CursorPosition,
    },

    /// Output of an `execute` request.
    ExecutionResult {
        outputs: Vec<OutputLine>,
        success: bool,
    },

    /// Reply to a heartbeat. `server_time` is milliseconds since the
    /// connection was accepted.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// The sender's last message was rejected. Codes follow HTTP
    /// conventions (400 malformed, 404 unknown room).
    Error { code: u16, message: String },
}

impl ServerMessage {
    /// Builds an [`ServerMessage::Error`].
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Delivery channel for this message.
    pub fn channel(&self) -> Channel {
        match self {
            Self::CursorUpdated { .. } => Channel::Unreliable,
            _ => Channel::ReliableOrdered,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope: the top-level wire format
// ---------------------------------------------------------------------------

/// Every frame on the wire is an `Envelope` around a client or server
/// message.
///
/// `seq`, `timestamp` and `channel` are optional on input, so a minimal
/// client frame is just `{"payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Per-sender sequence number.
    #[serde(default)]
    pub seq: u64,

    /// Milliseconds since the sender's connection started.
    #[serde(default)]
    pub timestamp: u64,

    #[serde(default)]
    pub channel: Channel,

    pub payload: P,
}

impl<P> Envelope<P> {
    /// Wraps a payload on the reliable ordered channel.
    pub fn new(seq: u64, timestamp: u64, payload: P) -> Self {
        Self {
            seq,
            timestamp,
            channel: Channel::ReliableOrdered,
            payload,
        }
    }
}

impl Envelope<ServerMessage> {
    /// Wraps a server message on the channel it asks for.
    pub fn outbound(seq: u64, timestamp: u64, payload: ServerMessage) -> Self {
        Self {
            seq,
            timestamp,
            channel: payload.channel(),
            payload,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The browser client parses these shapes directly, so the tests pin
    //! the JSON rather than round-tripping.

    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomId::from("room-42")).unwrap();
        assert_eq!(json, "\"room-42\"");
    }

    #[test]
    fn test_room_id_validity() {
        assert!(RoomId::from("x").is_valid());
        assert!(!RoomId::from("").is_valid());
    }

    #[test]
    fn test_participant_id_from_connection_id() {
        let pid = ParticipantId::from(ConnectionId::new(9));
        assert_eq!(pid, ParticipantId(9));
        assert_eq!(pid.to_string(), "P-9");
    }

    #[test]
    fn test_language_tag_wire_names() {
        assert_eq!(
            serde_json::to_value(LanguageTag::JavaScript).unwrap(),
            json!("javascript")
        );
        assert_eq!(
            serde_json::from_value::<LanguageTag>(json!("python")).unwrap(),
            LanguageTag::Python
        );
        assert_eq!(LanguageTag::default(), LanguageTag::JavaScript);
        assert_eq!(LanguageTag::Html.to_string(), "html");
    }

    #[test]
    fn test_unknown_language_is_rejected() {
        assert!(serde_json::from_value::<LanguageTag>(json!("cobol")).is_err());
    }

    #[test]
    fn test_client_join_json_format() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "join",
            "roomId": "r1",
            "displayId": "alice"
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                room_id: RoomId::from("r1"),
                display_id: Some("alice".into()),
            }
        );
    }

    #[test]
    fn test_client_join_display_id_is_optional() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "join", "roomId": "r1"})).unwrap();
        assert!(matches!(msg, ClientMessage::Join { display_id: None, .. }));
    }

    #[test]
    fn test_client_buffer_edit_without_language() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "bufferEdit",
            "roomId": "r1",
            "buffer": "console.log(1)"
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::BufferEdit {
                room_id: RoomId::from("r1"),
                buffer: "console.log(1)".into(),
                language: None,
            }
        );
    }

    #[test]
    fn test_client_cursor_move_json_format() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "cursorMove",
            "roomId": "r1",
            "position": {"lineNumber": 3, "column": 14}
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::CursorMove {
                room_id: RoomId::from("r1"),
                position: CursorPosition {
                    line_number: 3,
                    column: 14
                },
            }
        );
    }

    #[test]
    fn test_client_message_room_id_accessor() {
        let leave = ClientMessage::Leave {
            room_id: RoomId::from("r9"),
        };
        assert_eq!(leave.room_id(), Some(&RoomId::from("r9")));
        assert_eq!(ClientMessage::Heartbeat { client_time: 1 }.room_id(), None);
    }

    #[test]
    fn test_unknown_client_message_type_is_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_value(json!({"type": "flyToMoon", "roomId": "r1"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_room_state_json_format() {
        let msg = ServerMessage::RoomState {
            room_id: RoomId::from("r1"),
            buffer: "x".into(),
            language: LanguageTag::Python,
            member_count: 2,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "roomState",
                "roomId": "r1",
                "buffer": "x",
                "language": "python",
                "memberCount": 2
            })
        );
    }

    #[test]
    fn test_server_buffer_updated_omits_absent_language() {
        let msg = ServerMessage::BufferUpdated {
            buffer: "b".into(),
            language: None,
            origin: "alice".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "bufferUpdated");
        assert_eq!(value["origin"], "alice");
        assert!(value.get("language").is_none());
    }

    #[test]
    fn test_server_member_left_json_format() {
        let msg = ServerMessage::MemberLeft {
            display_id: "bob".into(),
            member_count: 1,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "memberLeft", "displayId": "bob", "memberCount": 1})
        );
    }

    #[test]
    fn test_output_kind_wire_names() {
        let kinds = [
            (OutputKind::Log, "log"),
            (OutputKind::Error, "error"),
            (OutputKind::Warn, "warn"),
            (OutputKind::Info, "info"),
            (OutputKind::Result, "result"),
        ];
        for (kind, name) in kinds {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(name));
            let parsed: OutputKind = serde_json::from_value(json!(name)).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_server_execution_result_json_format() {
        let msg = ServerMessage::ExecutionResult {
            outputs: vec![OutputLine::log("hi"), OutputLine::error("boom")],
            success: false,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "executionResult",
                "outputs": [
                    {"kind": "log", "content": "hi"},
                    {"kind": "error", "content": "boom"}
                ],
                "success": false
            })
        );
    }

    #[test]
    fn test_cursor_updates_use_unreliable_channel() {
        let cursor = ServerMessage::CursorUpdated {
            origin: "a".into(),
            position: CursorPosition {
                line_number: 1,
                column: 1,
            },
        };
        assert_eq!(cursor.channel(), Channel::Unreliable);
        assert_eq!(
            ServerMessage::error(400, "bad").channel(),
            Channel::ReliableOrdered
        );
        assert_eq!(
            Envelope::outbound(3, 0, cursor).channel,
            Channel::Unreliable
        );
    }

    #[test]
    fn test_envelope_defaults_when_fields_missing() {
        let env: Envelope<ClientMessage> = serde_json::from_value(json!({
            "payload": {"type": "heartbeat", "clientTime": 5}
        }))
        .unwrap();
        assert_eq!(env.seq, 0);
        assert_eq!(env.timestamp, 0);
        assert_eq!(env.channel, Channel::ReliableOrdered);
        assert_eq!(env.payload, ClientMessage::Heartbeat { client_time: 5 });
    }

    #[test]
    fn test_channel_serializes_as_pascal_case() {
        assert_eq!(
            serde_json::to_string(&Channel::Unreliable).unwrap(),
            "\"Unreliable\""
        );
    }
}

//! Unified error type for CodeSync.

use codesync_protocol::{ProtocolError, ServerMessage};
use codesync_room::RoomError;
use codesync_session::SessionError;
use codesync_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CodesyncError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (duplicate or unknown connection).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (unknown room).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The gateway task has stopped and no longer accepts commands.
    #[error("gateway is shut down")]
    GatewayClosed,

    /// The configured bind address could not be used.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodesyncError {
    /// Status code used when this error is reported to a client: 400 for
    /// bad requests, 404 for unknown rooms, 500 otherwise.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Protocol(_) | Self::Room(RoomError::NotMember(_)) => 400,
            Self::Room(RoomError::NotFound(_)) => 404,
            Self::Transport(_) | Self::Session(_) | Self::GatewayClosed | Self::Io(_) => 500,
        }
    }

    /// The `error` message sent to the client that caused this error.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.status_code(), self.to_string())
    }
}

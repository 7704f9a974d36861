//! Error types for the session layer.

use codesync_protocol::ParticipantId;

/// Errors that can occur while managing connection sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session for this participant is already registered.
    #[error("participant {0} already has an active session")]
    AlreadyConnected(ParticipantId),

    /// No session exists for the participant (never connected, or
    /// already disconnected).
    #[error("session not found for participant {0}")]
    NotFound(ParticipantId),
}

//! Error types for the room layer.

use codesync_protocol::RoomId;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist (never joined, or already reaped).
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The participant asked to leave a room it is not bound to.
    #[error("not a member of room {0}")]
    NotMember(RoomId),
}

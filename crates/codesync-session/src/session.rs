//! The record kept for each live connection.

use codesync_protocol::{ParticipantId, RoomId, ServerMessage};
use tokio::sync::mpsc;

/// Queue feeding one connection's writer.
///
/// Unbounded so the gateway never blocks on a slow client.
pub type OutboundSender = mpsc::UnboundedSender<ServerMessage>;

/// The connection handler's end of an [`OutboundSender`].
pub type OutboundReceiver = mpsc::UnboundedReceiver<ServerMessage>;

pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

/// One connected participant.
#[derive(Debug, Clone)]
pub struct Session {
    pub participant_id: ParticipantId,

    /// Name supplied by the client at join time, if any.
    pub display_id: Option<String>,

    /// The room this connection is bound to.
    pub room: Option<RoomId>,

    pub outbound: OutboundSender,
}

impl Session {
    pub fn new(participant_id: ParticipantId, outbound: OutboundSender) -> Self {
        Self {
            participant_id,
            display_id: None,
            room: None,
            outbound,
        }
    }

    /// The name other members see: the client-chosen display id, or the
    /// participant id's display form.
    pub fn display_name(&self) -> String {
        match &self.display_id {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.participant_id.to_string(),
        }
    }

    /// Queues a message for this connection.
    ///
    /// Returns `false` if the connection's writer has gone away; the
    /// message is dropped.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.outbound.send(msg).is_ok()
    }
}

//! The session table: every live connection, keyed by participant.
//!
//! Like the room store, the table is a plain `HashMap` owned by a single
//! task (the gateway actor). Callers never share it across threads.

use std::collections::HashMap;

use codesync_protocol::{ParticipantId, RoomId, ServerMessage};

use crate::{OutboundSender, Session, SessionError};

/// Registry of connected participants and their outbound queues.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ParticipantId, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the participant is already
    /// registered.
    pub fn connect(
        &mut self,
        participant_id: ParticipantId,
        outbound: OutboundSender,
    ) -> Result<(), SessionError> {
        if self.sessions.contains_key(&participant_id) {
            return Err(SessionError::AlreadyConnected(participant_id));
        }
        self.sessions
            .insert(participant_id, Session::new(participant_id, outbound));
        tracing::debug!(participant = %participant_id, "session registered");
        Ok(())
    }

    /// Removes a connection and returns its final state, so the caller
    /// can clean up the room it was bound to.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the participant is not registered.
    pub fn disconnect(&mut self, participant_id: ParticipantId) -> Result<Session, SessionError> {
        self.sessions
            .remove(&participant_id)
            .ok_or(SessionError::NotFound(participant_id))
    }

    /// Binds the connection to a room and records its display id.
    ///
    /// A `None` display id keeps whatever was set before.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the participant is not registered.
    pub fn bind(
        &mut self,
        participant_id: ParticipantId,
        room_id: RoomId,
        display_id: Option<String>,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(&participant_id)
            .ok_or(SessionError::NotFound(participant_id))?;
        session.room = Some(room_id);
        if display_id.is_some() {
            session.display_id = display_id;
        }
        Ok(())
    }

    /// Clears the connection's room binding and returns the room it had.
    pub fn unbind(&mut self, participant_id: ParticipantId) -> Option<RoomId> {
        self.sessions
            .get_mut(&participant_id)
            .and_then(|session| session.room.take())
    }

    pub fn room_of(&self, participant_id: ParticipantId) -> Option<&RoomId> {
        self.sessions
            .get(&participant_id)
            .and_then(|session| session.room.as_ref())
    }

    /// The name other members see for this participant.
    ///
    /// Falls back to the participant id's display form for unknown
    /// participants too, so notices can always be built.
    pub fn display_name(&self, participant_id: ParticipantId) -> String {
        self.sessions
            .get(&participant_id)
            .map_or_else(|| participant_id.to_string(), Session::display_name)
    }

    pub fn get(&self, participant_id: ParticipantId) -> Option<&Session> {
        self.sessions.get(&participant_id)
    }

    /// Queues a message for one participant.
    ///
    /// Returns `false` if the participant is unknown or its connection is
    /// closing; the message is dropped either way.
    pub fn send_to(&self, participant_id: ParticipantId, msg: ServerMessage) -> bool {
        match self.sessions.get(&participant_id) {
            Some(session) => session.send(msg),
            None => {
                tracing::debug!(participant = %participant_id, "dropping message for unknown session");
                false
            }
        }
    }

    /// Queues `msg` for every participant in `members` except `except`.
    ///
    /// Returns the number of connections the message was queued for.
    pub fn broadcast(
        &self,
        members: &[ParticipantId],
        except: Option<ParticipantId>,
        msg: &ServerMessage,
    ) -> usize {
        members
            .iter()
            .copied()
            .filter(|member| Some(*member) != except)
            .filter(|member| self.send_to(*member, msg.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

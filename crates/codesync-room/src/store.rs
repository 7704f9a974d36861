//! The authoritative in-memory store of every room.

use std::collections::HashMap;
use std::time::Duration;

use codesync_protocol::{LanguageTag, ParticipantId, RoomId};
use tokio::time::Instant;

use crate::members::Members;
use crate::reaper::{GracePeriodReaper, ReapDue, ReapSender};
use crate::template::default_buffer;
use crate::{RoomConfig, RoomError};

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One room's editable state and membership.
#[derive(Debug)]
pub struct Room {
    buffer: String,
    language: LanguageTag,
    members: Members,
    created_at: Instant,
    last_activity: Instant,
}

impl Room {
    fn new(language: LanguageTag) -> Self {
        let now = Instant::now();
        Self {
            buffer: default_buffer(language).to_owned(),
            language,
            members: Members::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn language(&self) -> LanguageTag {
        self.language
    }

    pub fn members(&self) -> &Members {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn snapshot(&self, room_id: &RoomId) -> RoomSnapshot {
        RoomSnapshot {
            room_id: room_id.clone(),
            buffer: self.buffer.clone(),
            language: self.language,
            member_count: self.members.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A copy of a room's state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub buffer: String,
    pub language: LanguageTag,
    pub member_count: usize,
}

/// Diagnostic view of a room, used by the periodic stats log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub member_count: usize,
    pub language: LanguageTag,
    pub age: Duration,
    pub idle: Duration,
}

/// The room a participant was moved out of by a join elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    /// Members left behind after the participant was removed.
    pub remaining: usize,
}

/// Result of [`RoomStore::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The joined room, including the new member.
    pub snapshot: RoomSnapshot,
    /// The participant was already in this room; the count did not change.
    pub already_member: bool,
    /// Set when the participant had to leave another room first.
    pub left: Option<Departure>,
}

// ---------------------------------------------------------------------------
// RoomStore
// ---------------------------------------------------------------------------

/// Owns every [`Room`] and the participant → room index.
///
/// All operations are synchronous and run to completion, so a single
/// owner (the gateway actor) gets atomic room updates without locks.
/// Creating or emptying a room arms a reap through the embedded
/// [`GracePeriodReaper`], which requires a running Tokio runtime.
pub struct RoomStore {
    config: RoomConfig,
    rooms: HashMap<RoomId, Room>,
    participant_rooms: HashMap<ParticipantId, RoomId>,
    reaper: GracePeriodReaper,
}

impl RoomStore {
    /// Creates an empty store. Fired reaps are posted to `reap_tx`; the
    /// owner must pass each one back to [`RoomStore::reap`].
    pub fn new(config: RoomConfig, reap_tx: ReapSender) -> Self {
        let reaper = GracePeriodReaper::new(config.grace_window, reap_tx);
        Self {
            config,
            rooms: HashMap::new(),
            participant_rooms: HashMap::new(),
            reaper,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Returns the room, creating it with the default template if needed.
    ///
    /// A room created here has no members yet, so it is armed for reaping
    /// like any other empty room.
    pub fn get_or_create(&mut self, room_id: &RoomId) -> &Room {
        if !self.rooms.contains_key(room_id) {
            self.reaper.arm(room_id.clone());
        }
        self.room_mut(room_id)
    }

    /// Adds `participant` to `room_id`, creating the room if needed.
    ///
    /// A participant belongs to at most one room: if it is bound to a
    /// different room it is removed from that one first. Joining the same
    /// room twice is idempotent.
    pub fn join(&mut self, room_id: &RoomId, participant: ParticipantId) -> JoinOutcome {
        let mut left = None;
        if let Some(current) = self.participant_rooms.get(&participant).cloned() {
            if current != *room_id {
                left = self
                    .leave(&current, participant)
                    .ok()
                    .map(|snapshot| Departure {
                        room_id: current,
                        remaining: snapshot.member_count,
                    });
            }
        }

        self.reaper.cancel(room_id);

        let room = self.room_mut(room_id);
        let already_member = !room.members.insert(participant);
        room.touch();
        let snapshot = room.snapshot(room_id);

        self.participant_rooms.insert(participant, room_id.clone());
        tracing::debug!(
            %room_id,
            %participant,
            members = snapshot.member_count,
            already_member,
            "participant joined room"
        );

        JoinOutcome {
            snapshot,
            already_member,
            left,
        }
    }

    /// Removes `participant` from `room_id`.
    ///
    /// If the room becomes empty a reap is armed. Leaving a room the
    /// participant is not in is harmless and still returns the snapshot.
    ///
    /// # Errors
    /// `RoomError::NotFound` if the room does not exist.
    pub fn leave(
        &mut self,
        room_id: &RoomId,
        participant: ParticipantId,
    ) -> Result<RoomSnapshot, RoomError> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            tracing::debug!(%room_id, %participant, "leave for unknown room");
            return Err(RoomError::NotFound(room_id.clone()));
        };

        room.members.remove(participant);
        room.touch();
        let snapshot = room.snapshot(room_id);
        let now_empty = room.members.is_empty();

        if self.participant_rooms.get(&participant) == Some(room_id) {
            self.participant_rooms.remove(&participant);
        }
        if now_empty {
            self.reaper.arm(room_id.clone());
        }

        tracing::debug!(
            %room_id,
            %participant,
            members = snapshot.member_count,
            "participant left room"
        );
        Ok(snapshot)
    }

    /// Replaces the room's buffer, and its language when one is given.
    ///
    /// Last writer wins; there is no merging.
    ///
    /// # Errors
    /// `RoomError::NotFound` if the room does not exist.
    pub fn update_buffer(
        &mut self,
        room_id: &RoomId,
        buffer: String,
        language: Option<LanguageTag>,
    ) -> Result<RoomSnapshot, RoomError> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            tracing::debug!(%room_id, "edit for unknown room");
            return Err(RoomError::NotFound(room_id.clone()));
        };

        room.buffer = buffer;
        if let Some(language) = language {
            room.language = language;
        }
        room.touch();
        Ok(room.snapshot(room_id))
    }

    pub fn snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        self.rooms.get(room_id).map(|room| room.snapshot(room_id))
    }

    /// Number of members in the room, 0 if it does not exist.
    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map_or(0, Room::member_count)
    }

    /// The room `participant` is currently in.
    pub fn find_room_of(&self, participant: ParticipantId) -> Option<&RoomId> {
        self.participant_rooms.get(&participant)
    }

    /// Current members of the room, for fan-out.
    pub fn members(&self, room_id: &RoomId) -> Vec<ParticipantId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.iter().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Applies a fired reap timer.
    ///
    /// Deletes the room only if `due` is still the current reap for it and
    /// the room is still empty. Returns `true` if the room was deleted.
    pub fn reap(&mut self, due: ReapDue) -> bool {
        if !self.reaper.take_if_current(&due) {
            tracing::debug!(room_id = %due.room_id, generation = due.generation, "stale reap ignored");
            return false;
        }

        let empty = self
            .rooms
            .get(&due.room_id)
            .is_some_and(|room| room.members.is_empty());
        if !empty {
            return false;
        }

        self.rooms.remove(&due.room_id);
        tracing::info!(room_id = %due.room_id, "room reaped after grace window");
        true
    }

    /// Diagnostic listing of every room, ordered by room id.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let now = Instant::now();
        let mut summaries: Vec<_> = self
            .rooms
            .iter()
            .map(|(room_id, room)| RoomSummary {
                room_id: room_id.clone(),
                member_count: room.members.len(),
                language: room.language,
                age: now.duration_since(room.created_at),
                idle: now.duration_since(room.last_activity),
            })
            .collect();
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of rooms currently waiting to be reaped.
    pub fn pending_reaps(&self) -> usize {
        self.reaper.pending_count()
    }

    fn room_mut(&mut self, room_id: &RoomId) -> &mut Room {
        let language = self.config.default_language;
        self.rooms.entry(room_id.clone()).or_insert_with(|| {
            tracing::info!(%room_id, %language, "room created");
            Room::new(language)
        })
    }
}

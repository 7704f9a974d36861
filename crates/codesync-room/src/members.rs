//! Membership tracking for a single room.

use std::collections::HashSet;

use codesync_protocol::ParticipantId;

/// The set of participants currently in a room.
///
/// A participant appears at most once; adding it again is a no-op.
#[derive(Debug, Clone, Default)]
pub struct Members {
    inner: HashSet<ParticipantId>,
}

impl Members {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant. Returns `false` if it was already present.
    pub fn insert(&mut self, participant: ParticipantId) -> bool {
        self.inner.insert(participant)
    }

    /// Removes a participant. Returns `false` if it was not present.
    pub fn remove(&mut self, participant: ParticipantId) -> bool {
        self.inner.remove(&participant)
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.inner.contains(&participant)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.inner.iter().copied()
    }
}

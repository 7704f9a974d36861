//! Deferred deletion of empty rooms.
//!
//! When a room's last member leaves, the room is not deleted right away:
//! participants often drop and reconnect (page reload, flaky network), and
//! they should find their buffer where they left it. Instead a reap is
//! *armed*: a timer task sleeps for the grace window, then posts a
//! [`ReapDue`] to whoever owns the [`RoomStore`](crate::RoomStore). The
//! owner feeds it back into [`RoomStore::reap`](crate::RoomStore::reap),
//! which deletes the room only if the reap is still current and the room
//! is still empty.
//!
//! ```text
//! last member leaves → arm(room)      ──sleep(grace)──▶ ReapDue{room, gen}
//! someone rejoins    → cancel(room)   (task aborted, entry removed)
//! ReapDue arrives    → take_if_current(due) && room empty → delete
//! ```
//!
//! Each arm gets a fresh generation, so a `ReapDue` that was already in
//! flight when the room was re-armed or cancelled is recognised as stale.

use std::collections::HashMap;
use std::time::Duration;

use codesync_protocol::RoomId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A fired reap timer, delivered to the owner of the room store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapDue {
    pub room_id: RoomId,
    pub generation: u64,
}

/// Sending half handed to the reaper; the store owner keeps the receiver.
pub type ReapSender = mpsc::UnboundedSender<ReapDue>;

/// Receiving half drained by the store owner.
pub type ReapReceiver = mpsc::UnboundedReceiver<ReapDue>;

/// Creates the channel pair connecting a reaper to its store owner.
pub fn reap_channel() -> (ReapSender, ReapReceiver) {
    mpsc::unbounded_channel()
}

struct PendingReap {
    generation: u64,
    task: JoinHandle<()>,
}

/// Table of pending reaps, at most one per room.
pub struct GracePeriodReaper {
    grace: Duration,
    next_generation: u64,
    pending: HashMap<RoomId, PendingReap>,
    due_tx: ReapSender,
}

impl GracePeriodReaper {
    pub fn new(grace: Duration, due_tx: ReapSender) -> Self {
        Self {
            grace,
            next_generation: 0,
            pending: HashMap::new(),
            due_tx,
        }
    }

    pub fn grace_window(&self) -> Duration {
        self.grace
    }

    /// Schedules a reap for `room_id`, replacing any pending one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm(&mut self, room_id: RoomId) -> u64 {
        self.cancel(&room_id);

        self.next_generation += 1;
        let generation = self.next_generation;

        let due = ReapDue {
            room_id: room_id.clone(),
            generation,
        };
        let due_tx = self.due_tx.clone();
        let grace = self.grace;
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // The owner may already be gone during shutdown.
            let _ = due_tx.send(due);
        });

        tracing::debug!(%room_id, generation, grace = ?self.grace, "reap armed");
        self.pending.insert(room_id, PendingReap { generation, task });
        generation
    }

    /// Cancels the pending reap for `room_id`. Returns `true` if one existed.
    pub fn cancel(&mut self, room_id: &RoomId) -> bool {
        match self.pending.remove(room_id) {
            Some(pending) => {
                pending.task.abort();
                tracing::debug!(%room_id, generation = pending.generation, "reap cancelled");
                true
            }
            None => false,
        }
    }

    /// Consumes the pending entry if `due` is the current reap for its room.
    ///
    /// Returns `false` for stale deliveries (the room was re-armed or
    /// cancelled after the timer fired).
    pub fn take_if_current(&mut self, due: &ReapDue) -> bool {
        let current = self
            .pending
            .get(&due.room_id)
            .is_some_and(|pending| pending.generation == due.generation);
        if current {
            self.pending.remove(&due.room_id);
        }
        current
    }

    pub fn is_pending(&self, room_id: &RoomId) -> bool {
        self.pending.contains_key(room_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for GracePeriodReaper {
    fn drop(&mut self) {
        for pending in self.pending.values() {
            pending.task.abort();
        }
    }
}

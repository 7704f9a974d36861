//! Room state for CodeSync.
//!
//! Rooms are created lazily on first join, hold one shared buffer and its
//! language, and are deleted only after they have been empty for a grace
//! window.
//!
//! # Key types
//!
//! - [`RoomStore`]: owns every room and the participant → room index
//! - [`Members`]: the membership set of one room
//! - [`GracePeriodReaper`]: deferred deletion of empty rooms
//! - [`RoomConfig`]: grace window and default language

mod config;
mod error;
mod members;
mod reaper;
mod store;
mod template;

pub use config::{DEFAULT_GRACE_WINDOW, RoomConfig};
pub use error::RoomError;
pub use members::Members;
pub use reaper::{GracePeriodReaper, ReapDue, ReapReceiver, ReapSender, reap_channel};
pub use store::{Departure, JoinOutcome, Room, RoomSnapshot, RoomStore, RoomSummary};
pub use template::default_buffer;

//! Room configuration.

use std::time::Duration;

use codesync_protocol::LanguageTag;
use serde::{Deserialize, Serialize};

/// How long an empty room is kept before it is deleted.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Settings shared by every room in a [`RoomStore`](crate::RoomStore).
///
/// Fixed at construction; the store never changes them at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// How long a room must stay empty before the reaper deletes it.
    pub grace_window: Duration,

    /// Language (and therefore template) of newly created rooms.
    pub default_language: LanguageTag,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            grace_window: DEFAULT_GRACE_WINDOW,
            default_language: LanguageTag::JavaScript,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.grace_window, Duration::from_secs(300));
        assert_eq!(config.default_language, LanguageTag::JavaScript);
    }
}

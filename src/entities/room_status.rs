use serde::{Deserialize, Serialize};
use std::fmt;

/// Room lifecycle status. Transitions happen server-side; the client only observes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Room is open, players can join by code
    #[default]
    Waiting,
    /// Game is in progress
    Playing,
    /// Game has ended
    Finished,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RoomStatus {
    /// Convert from the backend string representation
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "waiting" => Some(Self::Waiting),
            "playing" => Some(Self::Playing),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Convert to the backend string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
            Self::Finished => "finished",
        }
    }

    /// Check if players can join
    #[must_use]
    pub const fn can_join(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Check if the room is still live
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::Playing)
    }
}

/// Day/night indicator. Read-only in this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomPhase {
    Day,
    #[default]
    Night,
}

impl RoomPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Night => "night",
        }
    }
}

impl fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

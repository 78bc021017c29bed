use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Room, RoomStatus};

// ============ Request DTOs ============

/// Insert payload for a new room
#[derive(Debug, Clone, Serialize)]
pub struct NewRoom {
    pub host_id: Uuid,
    pub name: String,
    pub code: String,
    pub max_players: i32,
    pub status: RoomStatus,
}

/// Status-only update
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatusUpdate {
    pub status: RoomStatus,
}

// ============ Response DTOs ============

/// A waiting room together with its current head count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub room: Room,
    pub current_players: usize,
}

impl RoomSummary {
    #[must_use]
    pub fn is_full(&self) -> bool {
        i64::try_from(self.current_players).unwrap_or(i64::MAX) >= i64::from(self.room.max_players)
    }
}

/// Result of the backend's `check_game_setup` diagnostic procedure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SetupStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl SetupStatus {
    /// Status reported when the diagnostic procedure itself is not installed.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            status: "unknown".to_string(),
            message: Some("check_game_setup is not installed".to_string()),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RoomPhase, RoomStatus};

/// A joinable game session identified by a short code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub host_id: Uuid,
    pub status: RoomStatus,
    pub max_players: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub game_start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub game_end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phase: Option<RoomPhase>,
    #[serde(default)]
    pub round_number: Option<i32>,
}

impl Room {
    /// Phase shown to players; night until the backend says otherwise.
    #[must_use]
    pub fn display_phase(&self) -> RoomPhase {
        self.phase.unwrap_or_default()
    }

    /// Round shown to players; starts at 1.
    #[must_use]
    pub fn display_round(&self) -> i32 {
        self.round_number.unwrap_or(1)
    }

    #[must_use]
    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host_id == user_id
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One seat in a room. Unique per (room, user); created on join, deleted on leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    #[serde(default, rename = "avatar_character")]
    pub avatar: Option<String>,
    /// Placeholder assigned by the (absent) game engine
    #[serde(default)]
    pub role: Option<String>,
    pub is_alive: bool,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    /// Role in lowercase, `citizen` when unassigned.
    #[must_use]
    pub fn role_name(&self) -> String {
        self.role
            .as_deref()
            .map_or_else(|| "citizen".to_string(), str::to_lowercase)
    }
}

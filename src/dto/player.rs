use serde::Serialize;
use uuid::Uuid;

// ============ Request DTOs ============

/// Insert payload for joining a room
#[derive(Debug, Clone, Serialize)]
pub struct NewPlayer {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    #[serde(rename = "avatar_character", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub is_alive: bool,
}

/// Partial update of a player row
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_alive: Option<bool>,
}

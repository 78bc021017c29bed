use serde::Serialize;
use uuid::Uuid;

/// Insert payload for a chat line
#[derive(Debug, Clone, Serialize)]
pub struct NewChatMessage {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub message: String,
}

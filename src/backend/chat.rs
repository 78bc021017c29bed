use uuid::Uuid;

use super::{BackendClient, Direction, Query};
use crate::dto::NewChatMessage;
use crate::entities::{ChatMessage, tables};
use crate::error::AppError;

/// The newest `limit` messages of a room, returned oldest first.
///
/// # Errors
///
/// Returns the backend error.
pub async fn list_messages(
    client: &BackendClient,
    room_id: Uuid,
    limit: usize,
) -> Result<Vec<ChatMessage>, AppError> {
    let query = Query::new()
        .eq("room_id", room_id)
        .order("created_at", Direction::Descending)
        .limit(limit);
    let mut messages: Vec<ChatMessage> = client.select(tables::CHAT_MESSAGES, &query).await?;
    messages.reverse();
    Ok(messages)
}

/// # Errors
///
/// Returns the backend error.
pub async fn send_message(
    client: &BackendClient,
    message: &NewChatMessage,
) -> Result<ChatMessage, AppError> {
    client.insert(tables::CHAT_MESSAGES, message).await
}

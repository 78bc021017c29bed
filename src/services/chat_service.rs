use uuid::Uuid;

use crate::backend::chat;
use crate::context::AppContext;
use crate::dto::NewChatMessage;
use crate::entities::ChatMessage;
use crate::error::AppError;
use crate::utils::validation::validate_chat_message;

pub struct ChatService;

impl ChatService {
    /// Post `text` to the room under the signed-in user's display name.
    ///
    /// # Errors
    ///
    /// Blank or oversized text is rejected before any network call. Otherwise returns
    /// [`AppError::NotAuthenticated`] or the backend error.
    pub async fn send(ctx: &AppContext, room_id: Uuid, text: &str) -> Result<ChatMessage, AppError> {
        let message = validate_chat_message(text)?;
        let identity = ctx.require_identity().await?;
        let sent = chat::send_message(
            ctx.client(),
            &NewChatMessage {
                room_id,
                user_id: identity.user_id,
                username: identity.display_name,
                message,
            },
        )
        .await?;
        tracing::debug!(%room_id, message_id = %sent.id, "message sent");
        Ok(sent)
    }

    /// The newest messages of a room, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn history(ctx: &AppContext, room_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        chat::list_messages(ctx.client(), room_id, ctx.config().chat_history_limit).await
    }
}

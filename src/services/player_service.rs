use uuid::Uuid;

use crate::backend::players;
use crate::context::AppContext;
use crate::dto::{NewPlayer, PlayerUpdate};
use crate::entities::{Player, Room};
use crate::error::AppError;

pub struct PlayerService;

impl PlayerService {
    /// Take a seat in `room` as the signed-in user.
    ///
    /// Idempotent: a user who already has a seat gets that seat back. The room becomes the
    /// context's current room.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotAuthenticated`], a validation error when the room no longer
    /// accepts players, [`AppError::RoomFull`] at capacity, or the backend error.
    pub async fn join(ctx: &AppContext, room: &Room) -> Result<Player, AppError> {
        let identity = ctx.require_identity().await?;

        if !room.status.can_join() {
            return Err(AppError::Validation(format!(
                "Room {} is already {}",
                room.code, room.status
            )));
        }

        let seated = players::list_players(ctx.client(), room.id).await?;
        if let Some(existing) = seated.iter().find(|p| p.user_id == identity.user_id) {
            tracing::debug!(room_id = %room.id, "already seated");
            ctx.set_current_room(Some(room.id)).await;
            return Ok(existing.clone());
        }

        if i64::try_from(seated.len()).unwrap_or(i64::MAX) >= i64::from(room.max_players) {
            return Err(AppError::RoomFull {
                code: room.code.clone(),
                max_players: room.max_players,
            });
        }

        let new_player = NewPlayer {
            room_id: room.id,
            user_id: identity.user_id,
            username: identity.display_name.clone(),
            avatar: identity.avatar.clone(),
            is_alive: true,
        };
        let player = players::join_room(ctx.client(), &new_player).await?;
        ctx.set_current_room(Some(room.id)).await;
        tracing::info!(room_id = %room.id, user_id = %identity.user_id, "joined room");
        Ok(player)
    }

    /// Give up the signed-in user's seat.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotAuthenticated`] or the backend error.
    pub async fn leave(ctx: &AppContext, room_id: Uuid) -> Result<(), AppError> {
        let identity = ctx.require_identity().await?;
        players::leave_room(ctx.client(), room_id, identity.user_id).await?;
        if ctx.current_room().await == Some(room_id) {
            ctx.set_current_room(None).await;
        }
        tracing::info!(%room_id, user_id = %identity.user_id, "left room");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn list(ctx: &AppContext, room_id: Uuid) -> Result<Vec<Player>, AppError> {
        players::list_players(ctx.client(), room_id).await
    }

    /// Update a seated player's role or liveness.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when the user has no seat, or the backend error.
    pub async fn update(
        ctx: &AppContext,
        room_id: Uuid,
        user_id: Uuid,
        changes: &PlayerUpdate,
    ) -> Result<Player, AppError> {
        players::update_player(ctx.client(), room_id, user_id, changes).await
    }
}

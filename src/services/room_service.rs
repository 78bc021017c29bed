use uuid::Uuid;

use crate::backend::rooms;
use crate::context::AppContext;
use crate::dto::{NewRoom, RoomSummary};
use crate::entities::{Player, Room, RoomStatus};
use crate::error::AppError;
use crate::services::PlayerService;
use crate::sync::lobby::fetch_waiting_rooms;
use crate::utils::generate_room_code;
use crate::utils::validation::{
    DEFAULT_MAX_PLAYERS, validate_join_code, validate_max_players, validate_room_name,
};

pub struct RoomService;

impl RoomService {
    /// Create a waiting room hosted by the signed-in user.
    ///
    /// The host is not seated; joining is a separate, explicit step.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, [`AppError::NotAuthenticated`],
    /// or the backend error ([`AppError::Conflict`] on a join-code collision).
    pub async fn create_room(
        ctx: &AppContext,
        name: &str,
        max_players: Option<i32>,
    ) -> Result<Room, AppError> {
        let name = validate_room_name(name)?;
        let max_players = validate_max_players(max_players.unwrap_or(DEFAULT_MAX_PLAYERS))?;
        let identity = ctx.require_identity().await?;

        let new_room = NewRoom {
            host_id: identity.user_id,
            name,
            code: generate_room_code(),
            max_players,
            status: RoomStatus::Waiting,
        };
        let room = rooms::create_room(ctx.client(), &new_room).await?;
        tracing::info!(room_id = %room.id, code = %room.code, "room created");
        Ok(room)
    }

    /// Waiting rooms with their current head counts, newest first.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn list_waiting_rooms(ctx: &AppContext) -> Result<Vec<RoomSummary>, AppError> {
        fetch_waiting_rooms(ctx.client()).await
    }

    /// The waiting room with this join code.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed codes (no network call), or
    /// [`AppError::NotFound`].
    pub async fn find_by_code(ctx: &AppContext, code: &str) -> Result<Room, AppError> {
        let code = validate_join_code(code)?;
        rooms::get_room_by_code(ctx.client(), &code)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound(format!("No open room with code {code}")),
                other => other,
            })
    }

    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] or the backend error.
    pub async fn get_room(ctx: &AppContext, room_id: Uuid) -> Result<Room, AppError> {
        rooms::get_room(ctx.client(), room_id).await
    }

    /// Resolve `code` and take a seat in that room.
    ///
    /// # Errors
    ///
    /// See [`RoomService::find_by_code`] and [`PlayerService::join`].
    pub async fn join_by_code(ctx: &AppContext, code: &str) -> Result<(Room, Player), AppError> {
        let room = Self::find_by_code(ctx, code).await?;
        let player = PlayerService::join(ctx, &room).await?;
        Ok((room, player))
    }

    /// Change the room status. Host only.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotHost`] for anyone but the host, or the backend error.
    pub async fn set_status(
        ctx: &AppContext,
        room_id: Uuid,
        status: RoomStatus,
    ) -> Result<Room, AppError> {
        Self::require_host(ctx, room_id, "change the room status").await?;
        let room = rooms::update_room_status(ctx.client(), room_id, status).await?;
        tracing::info!(%room_id, status = %room.status, "room status changed");
        Ok(room)
    }

    /// Delete the room. Host only.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotHost`] for anyone but the host, or the backend error.
    pub async fn close_room(ctx: &AppContext, room_id: Uuid) -> Result<(), AppError> {
        Self::require_host(ctx, room_id, "close the room").await?;
        rooms::delete_room(ctx.client(), room_id).await?;
        if ctx.current_room().await == Some(room_id) {
            ctx.set_current_room(None).await;
        }
        tracing::info!(%room_id, "room closed");
        Ok(())
    }

    async fn require_host(ctx: &AppContext, room_id: Uuid, action: &str) -> Result<Room, AppError> {
        let identity = ctx.require_identity().await?;
        let room = rooms::get_room(ctx.client(), room_id).await?;
        if !room.is_host(identity.user_id) {
            return Err(AppError::NotHost {
                action: action.to_string(),
            });
        }
        Ok(room)
    }
}

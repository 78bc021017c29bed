use serde::de::IgnoredAny;
use uuid::Uuid;

use super::{BackendClient, Direction, Query};
use crate::dto::{NewPlayer, PlayerUpdate};
use crate::entities::{Player, tables};
use crate::error::AppError;

/// Players seated in a room, in join order.
///
/// # Errors
///
/// Returns the backend error.
pub async fn list_players(client: &BackendClient, room_id: Uuid) -> Result<Vec<Player>, AppError> {
    let query = Query::new()
        .eq("room_id", room_id)
        .order("joined_at", Direction::Ascending);
    client.select(tables::PLAYERS, &query).await
}

/// Number of players seated in a room.
///
/// # Errors
///
/// Returns the backend error.
pub async fn count_players(client: &BackendClient, room_id: Uuid) -> Result<usize, AppError> {
    let query = Query::new().select("id").eq("room_id", room_id);
    let rows: Vec<IgnoredAny> = client.select(tables::PLAYERS, &query).await?;
    Ok(rows.len())
}

/// # Errors
///
/// Returns the backend error, [`AppError::Conflict`] if the user already has a seat.
pub async fn join_room(client: &BackendClient, player: &NewPlayer) -> Result<Player, AppError> {
    client.insert(tables::PLAYERS, player).await
}

/// # Errors
///
/// Returns the backend error.
pub async fn leave_room(
    client: &BackendClient,
    room_id: Uuid,
    user_id: Uuid,
) -> Result<(), AppError> {
    let query = Query::new().eq("room_id", room_id).eq("user_id", user_id);
    client.delete(tables::PLAYERS, &query).await
}

/// # Errors
///
/// Returns the backend error.
pub async fn update_player(
    client: &BackendClient,
    room_id: Uuid,
    user_id: Uuid,
    changes: &PlayerUpdate,
) -> Result<Player, AppError> {
    let query = Query::new().eq("room_id", room_id).eq("user_id", user_id);
    client.update(tables::PLAYERS, &query, changes).await
}

use uuid::Uuid;

use super::{BackendClient, Direction, Query};
use crate::dto::{NewRoom, RoomStatusUpdate};
use crate::entities::{Room, RoomStatus, tables};
use crate::error::AppError;

/// Rooms open for joining, newest first.
///
/// # Errors
///
/// Returns the backend error.
pub async fn list_waiting(client: &BackendClient) -> Result<Vec<Room>, AppError> {
    let query = Query::new()
        .eq("status", RoomStatus::Waiting)
        .order("created_at", Direction::Descending);
    client.select(tables::ROOMS, &query).await
}

/// # Errors
///
/// Returns [`AppError::NotFound`] when no room has this id.
pub async fn get_room(client: &BackendClient, room_id: Uuid) -> Result<Room, AppError> {
    client
        .select_one(tables::ROOMS, &Query::new().eq("id", room_id))
        .await
}

/// Waiting room with this join code (case-insensitive).
///
/// # Errors
///
/// Returns [`AppError::NotFound`] when no waiting room has this code.
pub async fn get_room_by_code(client: &BackendClient, code: &str) -> Result<Room, AppError> {
    let query = Query::new()
        .eq("code", code.trim().to_uppercase())
        .eq("status", RoomStatus::Waiting);
    client.select_one(tables::ROOMS, &query).await
}

/// # Errors
///
/// Returns the backend error, e.g. [`AppError::Conflict`] on a code collision.
pub async fn create_room(client: &BackendClient, room: &NewRoom) -> Result<Room, AppError> {
    client.insert(tables::ROOMS, room).await
}

/// # Errors
///
/// Returns the backend error.
pub async fn update_room_status(
    client: &BackendClient,
    room_id: Uuid,
    status: RoomStatus,
) -> Result<Room, AppError> {
    client
        .update(
            tables::ROOMS,
            &Query::new().eq("id", room_id),
            &RoomStatusUpdate { status },
        )
        .await
}

/// # Errors
///
/// Returns the backend error.
pub async fn delete_room(client: &BackendClient, room_id: Uuid) -> Result<(), AppError> {
    client
        .delete(tables::ROOMS, &Query::new().eq("id", room_id))
        .await
}

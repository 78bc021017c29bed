use uuid::Uuid;

use super::{BackendClient, Query};
use crate::dto::ProfileUpdate;
use crate::dto::profile::ProfileRow;
use crate::entities::{Profile, tables};
use crate::error::AppError;

/// # Errors
///
/// Returns [`AppError::NotFound`] when the user has no profile yet.
pub async fn get_profile(client: &BackendClient, user_id: Uuid) -> Result<Profile, AppError> {
    client
        .select_one(tables::PROFILES, &Query::new().eq("id", user_id))
        .await
}

/// Create the profile or merge `update` into the existing one.
///
/// # Errors
///
/// Returns the backend error, [`AppError::Conflict`] if the username is taken.
pub async fn upsert_profile(
    client: &BackendClient,
    user_id: Uuid,
    update: &ProfileUpdate,
) -> Result<Profile, AppError> {
    let row = ProfileRow {
        id: user_id,
        update,
    };
    client.upsert(tables::PROFILES, &row).await
}

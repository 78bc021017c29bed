use serde_json::json;

use super::BackendClient;
use crate::dto::SetupStatus;
use crate::error::AppError;

const CHECK_GAME_SETUP: &str = "check_game_setup";

/// Ask the backend whether the game schema is installed.
///
/// A backend without the diagnostic procedure reports [`SetupStatus::unknown`] instead of
/// failing; a missing schema surfaces as `status == "error"`.
///
/// # Errors
///
/// Returns transport and other backend errors.
pub async fn check_game_setup(client: &BackendClient) -> Result<SetupStatus, AppError> {
    match client.rpc(CHECK_GAME_SETUP, &json!({})).await {
        Ok(status) => Ok(status),
        Err(AppError::SetupMissing(msg) | AppError::NotFound(msg)) => {
            tracing::debug!(%msg, "setup diagnostic unavailable");
            Ok(SetupStatus::unknown())
        }
        Err(err) => Err(err),
    }
}

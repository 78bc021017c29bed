use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;

/// Unified client error type.
///
/// Validation errors are raised before any network call. Backend errors are classified
/// from the structured `code` field of the response body, never from message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Local input validation failed; nothing was sent.
    Validation(String),
    /// The operation needs a signed-in user.
    NotAuthenticated,
    /// 401/403 from the backend
    Unauthorized(String),
    /// Zero rows for a single-row read, or 404
    NotFound(String),
    /// Unique constraint violation
    Conflict(String),
    /// Room has no free seat
    RoomFull { code: String, max_players: i32 },
    /// Action reserved to the room host
    NotHost { action: String },
    /// Backend schema or procedure is missing; needs database setup
    SetupMissing(String),
    /// Any other error reported by the backend
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// Network failure or timeout
    Transport(String),
    /// Configuration error
    Config(String),
    /// Internal client error
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::NotAuthenticated => write!(f, "Not signed in"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::RoomFull { code, max_players } => {
                write!(f, "Room {code} is full ({max_players} players)")
            }
            Self::NotHost { action } => write!(f, "Only the host can {action}"),
            Self::SetupMissing(msg) => write!(f, "Database setup required: {msg}"),
            Self::Backend {
                status,
                code: Some(code),
                message,
            } => write!(f, "Backend error {status} ({code}): {message}"),
            Self::Backend {
                status,
                code: None,
                message,
            } => write!(f, "Backend error {status}: {message}"),
            Self::Transport(msg) => write!(f, "Network error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Errors worth retrying on the next sync cycle without user involvement.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the backend reported that its schema or procedures are not installed.
    #[must_use]
    pub const fn is_setup_missing(&self) -> bool {
        matches!(self, Self::SetupMissing(_))
    }

    /// Classify a non-success backend response.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let code = parsed.code();
        let message = parsed.message().unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });

        match code.as_deref() {
            Some(SCHEMA_CACHE_MISS | UNDEFINED_TABLE | RPC_NOT_FOUND | UNDEFINED_FUNCTION) => {
                return Self::SetupMissing(message);
            }
            Some(NO_ROWS) => return Self::NotFound(message),
            Some(UNIQUE_VIOLATION) => return Self::Conflict(message),
            _ => {}
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            _ => Self::Backend {
                status: status.as_u16(),
                code,
                message,
            },
        }
    }
}

const SCHEMA_CACHE_MISS: &str = "PGRST205";
const RPC_NOT_FOUND: &str = "PGRST202";
const NO_ROWS: &str = "PGRST116";
const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_FUNCTION: &str = "42883";
const UNIQUE_VIOLATION: &str = "23505";

/// Union of the REST (`code`/`message`) and auth (`error_code`/`msg`, `error`/`error_description`)
/// error body shapes.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    error_code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        // The auth service puts the HTTP status in `code` and the symbolic code in `error_code`.
        self.error_code.clone().or_else(|| match &self.code {
            Some(serde_json::Value::String(code)) => Some(code.clone()),
            _ => self.error.clone(),
        })
    }

    fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Internal(format!("Malformed backend response: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("Malformed backend response: {err}"))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("Invalid URL: {err}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_table_is_setup_error() {
        let body = r#"{"code":"PGRST205","details":null,"hint":null,"message":"Could not find the table 'public.game_rooms' in the schema cache"}"#;
        let err = AppError::from_response(StatusCode::NOT_FOUND, body);
        assert!(err.is_setup_missing());
    }

    #[test]
    fn test_undefined_table_is_setup_error() {
        let body = r#"{"code":"42P01","message":"relation \"public.chat_messages\" does not exist"}"#;
        let err = AppError::from_response(StatusCode::BAD_REQUEST, body);
        assert!(err.is_setup_missing());
    }

    #[test]
    fn test_message_text_alone_does_not_mean_setup_missing() {
        let body = r#"{"code":"22P02","message":"game_rooms: invalid input syntax"}"#;
        let err = AppError::from_response(StatusCode::BAD_REQUEST, body);
        assert!(!err.is_setup_missing());
        assert!(matches!(err, AppError::Backend { status: 400, .. }));
    }

    #[test]
    fn test_single_row_miss_is_not_found() {
        let body = r#"{"code":"PGRST116","message":"JSON object requested, multiple (or no) rows returned"}"#;
        assert!(matches!(
            AppError::from_response(StatusCode::NOT_ACCEPTABLE, body),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        assert!(matches!(
            AppError::from_response(StatusCode::CONFLICT, body),
            AppError::Conflict(_)
        ));
    }

    #[test]
    fn test_auth_error_shapes() {
        let body = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
        let err = AppError::from_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(
            err,
            AppError::Backend {
                status: 400,
                code: Some("invalid_credentials".to_string()),
                message: "Invalid login credentials".to_string(),
            }
        );

        let body = r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#;
        let err = AppError::from_response(StatusCode::UNAUTHORIZED, body);
        assert_eq!(
            err,
            AppError::Unauthorized("Refresh Token Not Found".to_string())
        );
    }

    #[test]
    fn test_empty_body_uses_status_reason() {
        let err = AppError::from_response(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "Backend error 502: Bad Gateway");
    }

    #[test]
    fn test_transport_is_transient() {
        assert!(AppError::Transport("timed out".to_string()).is_transient());
        assert!(!AppError::NotAuthenticated.is_transient());
    }
}

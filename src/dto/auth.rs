use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated user as reported by the auth service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl User {
    /// Username stored in auth metadata at sign-up, if any.
    #[must_use]
    pub fn metadata_username(&self) -> Option<&str> {
        self.user_metadata
            .get("username")
            .and_then(serde_json::Value::as_str)
            .filter(|u| !u.trim().is_empty())
    }

    /// Fallback display name when no profile exists.
    #[must_use]
    pub fn fallback_name(&self) -> String {
        self.metadata_username()
            .map(str::to_string)
            .or_else(|| self.email.clone().filter(|e| !e.is_empty()))
            .or_else(|| self.phone.clone().filter(|p| !p.is_empty()))
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Access/refresh token pair with the user it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    /// Fill `expires_at` from `expires_in` when the server only sent the latter.
    #[must_use]
    pub fn with_expiry(mut self) -> Self {
        if self.expires_at.is_none()
            && let Some(expires_in) = self.expires_in
        {
            self.expires_at = Some(Utc::now().timestamp() + expires_in);
        }
        self
    }

    /// Whether the access token expires within `margin_secs` of `now` (unix seconds).
    #[must_use]
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - now <= margin_secs)
    }
}

/// Sign-up either signs the user in immediately or waits for e-mail confirmation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SignUpOutcome {
    SignedIn(Session),
    ConfirmationRequired(User),
}

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Claims carried by the backend's access tokens.
///
/// The client never holds the signing secret; claims are read for expiry checks and
/// identity display only, and the backend remains the authority on validity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user ID as a UUID string.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued-at time (Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Database role, `authenticated` for signed-in users.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl Claims {
    /// Whether the token expires within `margin_secs` from now.
    #[must_use]
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        self.exp - Utc::now().timestamp() <= margin_secs
    }
}

/// Read the claims of an access token without verifying its signature.
///
/// # Errors
///
/// Returns an error if the token is not a well-formed JWT.
pub fn read_claims(token: &str) -> anyhow::Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| anyhow::anyhow!("Malformed access token: {e}"))?;

    Ok(token_data.claims)
}

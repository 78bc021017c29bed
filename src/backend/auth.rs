use std::fmt;

use reqwest::Method;
use serde_json::json;
use url::Url;

use super::{BackendClient, read_empty, read_json};
use crate::dto::{Session, SignUpOutcome, User};
use crate::error::AppError;

/// Redirect-based sign-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Apple,
}

impl OAuthProvider {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "google" => Some(Self::Google),
            "apple" => Some(Self::Apple),
            _ => None,
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

async fn token_grant(
    client: &BackendClient,
    grant_type: &str,
    body: serde_json::Value,
) -> Result<Session, AppError> {
    let mut url = client.auth_endpoint("token")?;
    url.query_pairs_mut().append_pair("grant_type", grant_type);
    let resp = client
        .auth_request(Method::POST, url, None)
        .json(&body)
        .send()
        .await?;
    let session: Session = read_json(resp).await?;
    Ok(session.with_expiry())
}

/// Register with e-mail and password. `username` is stored in the user metadata.
///
/// # Errors
///
/// Returns the backend error (e.g. already registered, weak password).
pub async fn sign_up(
    client: &BackendClient,
    email: &str,
    password: &str,
    username: Option<&str>,
) -> Result<SignUpOutcome, AppError> {
    tracing::debug!("sign up");
    let url = client.auth_endpoint("signup")?;
    let data = username.map_or_else(|| json!({}), |u| json!({ "username": u }));
    let resp = client
        .auth_request(Method::POST, url, None)
        .json(&json!({ "email": email, "password": password, "data": data }))
        .send()
        .await?;
    let outcome: SignUpOutcome = read_json(resp).await?;
    Ok(match outcome {
        SignUpOutcome::SignedIn(session) => SignUpOutcome::SignedIn(session.with_expiry()),
        pending @ SignUpOutcome::ConfirmationRequired(_) => pending,
    })
}

/// # Errors
///
/// Returns the backend error, typically invalid credentials or unconfirmed e-mail.
pub async fn sign_in_with_password(
    client: &BackendClient,
    email: &str,
    password: &str,
) -> Result<Session, AppError> {
    tracing::debug!("password sign in");
    token_grant(
        client,
        "password",
        json!({ "email": email, "password": password }),
    )
    .await
}

/// # Errors
///
/// Returns [`AppError::Unauthorized`] once the refresh token is revoked or expired.
pub async fn refresh_session(
    client: &BackendClient,
    refresh_token: &str,
) -> Result<Session, AppError> {
    tracing::debug!("refresh session");
    token_grant(
        client,
        "refresh_token",
        json!({ "refresh_token": refresh_token }),
    )
    .await
}

/// Send a one-time password by SMS. Creates the user on first use.
///
/// # Errors
///
/// Returns the backend error; an unconfigured SMS provider is reported as a backend error
/// with code `sms_send_failed` or `phone_provider_disabled`.
pub async fn send_otp(client: &BackendClient, phone: &str) -> Result<(), AppError> {
    tracing::debug!("send otp");
    let url = client.auth_endpoint("otp")?;
    let resp = client
        .auth_request(Method::POST, url, None)
        .json(&json!({ "phone": phone, "create_user": true }))
        .send()
        .await?;
    read_empty(resp).await
}

/// # Errors
///
/// Returns the backend error for wrong or expired codes.
pub async fn verify_otp(
    client: &BackendClient,
    phone: &str,
    token: &str,
) -> Result<Session, AppError> {
    tracing::debug!("verify otp");
    let url = client.auth_endpoint("verify")?;
    let resp = client
        .auth_request(Method::POST, url, None)
        .json(&json!({ "type": "sms", "phone": phone, "token": token }))
        .send()
        .await?;
    let session: Session = read_json(resp).await?;
    Ok(session.with_expiry())
}

/// Authorization URL for a redirect-based sign-in using PKCE (S256).
///
/// # Errors
///
/// Returns an error if the auth endpoint URL cannot be built.
pub fn authorize_url(
    client: &BackendClient,
    provider: OAuthProvider,
    redirect_to: &str,
    code_challenge: &str,
) -> Result<Url, AppError> {
    let mut url = client.auth_endpoint("authorize")?;
    url.query_pairs_mut()
        .append_pair("provider", provider.as_str())
        .append_pair("redirect_to", redirect_to)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", "s256");
    Ok(url)
}

/// Exchange the authorization code from the redirect for a session.
///
/// # Errors
///
/// Returns the backend error for unknown codes or verifier mismatch.
pub async fn exchange_code_for_session(
    client: &BackendClient,
    auth_code: &str,
    code_verifier: &str,
) -> Result<Session, AppError> {
    tracing::debug!("pkce exchange");
    token_grant(
        client,
        "pkce",
        json!({ "auth_code": auth_code, "code_verifier": code_verifier }),
    )
    .await
}

/// The user owning `access_token`.
///
/// # Errors
///
/// Returns [`AppError::Unauthorized`] for invalid or expired tokens.
pub async fn get_user(client: &BackendClient, access_token: &str) -> Result<User, AppError> {
    let url = client.auth_endpoint("user")?;
    let resp = client
        .auth_request(Method::GET, url, Some(access_token))
        .send()
        .await?;
    read_json(resp).await
}

/// Revoke the session owning `access_token`.
///
/// # Errors
///
/// Returns the backend error.
pub async fn sign_out(client: &BackendClient, access_token: &str) -> Result<(), AppError> {
    tracing::debug!("sign out");
    let url = client.auth_endpoint("logout")?;
    let resp = client
        .auth_request(Method::POST, url, Some(access_token))
        .send()
        .await?;
    read_empty(resp).await
}

use std::time::Duration;

use crate::auth::PendingAuthorization;
use crate::auth::oauth;
use crate::backend::auth::{self, OAuthProvider};
use crate::context::{AppContext, Identity};
use crate::dto::SignUpOutcome;
use crate::error::AppError;
use crate::utils::validation::{
    validate_email, validate_otp, validate_password, validate_phone, validate_username,
};

pub struct AuthService;

impl AuthService {
    /// Register with e-mail and password.
    ///
    /// Returns `None` when the backend requires e-mail confirmation before the first sign-in.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or the backend error.
    pub async fn sign_up(
        ctx: &AppContext,
        email: &str,
        password: &str,
        confirmation: &str,
        username: Option<&str>,
    ) -> Result<Option<Identity>, AppError> {
        let email = validate_email(email)?;
        validate_password(password, Some(confirmation))?;
        let username = username.map(validate_username).transpose()?;

        match auth::sign_up(ctx.client(), &email, password, username.as_deref()).await? {
            SignUpOutcome::SignedIn(session) => ctx.establish(session).await.map(Some),
            SignUpOutcome::ConfirmationRequired(user) => {
                tracing::info!(user_id = %user.id, "sign-up awaiting e-mail confirmation");
                Ok(None)
            }
        }
    }

    /// # Errors
    ///
    /// Returns a validation error before any network call, or the backend error.
    pub async fn sign_in(
        ctx: &AppContext,
        email: &str,
        password: &str,
    ) -> Result<Identity, AppError> {
        let email = validate_email(email)?;
        validate_password(password, None)?;
        let session = auth::sign_in_with_password(ctx.client(), &email, password).await?;
        ctx.establish(session).await
    }

    /// Text a one-time code to `phone`; returns the normalized number to verify against.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or the backend error.
    pub async fn send_phone_code(ctx: &AppContext, phone: &str) -> Result<String, AppError> {
        let phone = validate_phone(phone)?;
        auth::send_otp(ctx.client(), &phone).await?;
        tracing::info!("verification code sent");
        Ok(phone)
    }

    /// # Errors
    ///
    /// Returns a validation error before any network call, or the backend error.
    pub async fn verify_phone_code(
        ctx: &AppContext,
        phone: &str,
        code: &str,
    ) -> Result<Identity, AppError> {
        let phone = validate_phone(phone)?;
        let code = validate_otp(code)?;
        let session = auth::verify_otp(ctx.client(), &phone, &code).await?;
        ctx.establish(session).await
    }

    /// Start a redirect sign-in; open the returned URL in a browser.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect receiver cannot listen on the configured port.
    pub async fn begin_oauth(
        ctx: &AppContext,
        provider: OAuthProvider,
    ) -> Result<PendingAuthorization, AppError> {
        oauth::begin(ctx.client(), provider, ctx.config().oauth_redirect_port).await
    }

    /// # Errors
    ///
    /// Returns an error on timeout, state mismatch, provider refusal or failed exchange.
    pub async fn finish_oauth(
        ctx: &AppContext,
        pending: PendingAuthorization,
        timeout: Duration,
    ) -> Result<Identity, AppError> {
        let session = pending.finish(ctx.client(), timeout).await?;
        ctx.establish(session).await
    }

    /// # Errors
    ///
    /// Returns an error if the local session cannot be cleared.
    pub async fn sign_out(ctx: &AppContext) -> Result<(), AppError> {
        ctx.teardown().await
    }
}

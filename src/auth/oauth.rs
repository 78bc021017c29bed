//! Redirect-based sign-in: PKCE authorization URL plus a loopback receiver for the redirect.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use oauth2::{CsrfToken, PkceCodeChallenge, PkceCodeVerifier};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use url::Url;

use crate::backend::BackendClient;
use crate::backend::auth::{OAuthProvider, authorize_url, exchange_code_for_session};
use crate::dto::Session;
use crate::error::AppError;

pub const CALLBACK_PATH: &str = "/auth/callback";

/// An authorization in progress: open `url` in a browser, then call [`Self::finish`].
pub struct PendingAuthorization {
    pub url: Url,
    verifier: PkceCodeVerifier,
    state: CsrfToken,
    listener: TcpListener,
}

/// Query parameters appended to the redirect by the auth service.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// Bind the loopback receiver and build the authorization URL.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the URL cannot be built.
pub async fn begin(
    client: &BackendClient,
    provider: OAuthProvider,
    port: u16,
) -> Result<PendingAuthorization, AppError> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .await
        .map_err(|e| AppError::Config(format!("Cannot listen on port {port}: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let state = CsrfToken::new_random();

    let mut redirect = Url::parse(&format!("http://{addr}{CALLBACK_PATH}"))?;
    redirect
        .query_pairs_mut()
        .append_pair("state", state.secret());

    let url = authorize_url(client, provider, redirect.as_str(), challenge.as_str())?;
    tracing::info!(%provider, %addr, "waiting for OAuth redirect");

    Ok(PendingAuthorization {
        url,
        verifier,
        state,
        listener,
    })
}

impl PendingAuthorization {
    /// Address the redirect receiver listens on.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address is unavailable.
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        self.listener
            .local_addr()
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Wait for the redirect (up to `timeout`) and exchange its code for a session.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, CSRF state mismatch, provider error, or failed exchange.
    pub async fn finish(
        self,
        client: &BackendClient,
        timeout: Duration,
    ) -> Result<Session, AppError> {
        let Self {
            verifier,
            state,
            listener,
            ..
        } = self;

        let params = receive_callback(listener, timeout).await?;

        if let Some(error) = params.error {
            let detail = params.error_description.unwrap_or_default();
            return Err(AppError::Unauthorized(format!("{error}: {detail}")));
        }
        if params.state.as_deref() != Some(state.secret().as_str()) {
            return Err(AppError::Unauthorized(
                "OAuth state mismatch; sign-in was not started here".to_string(),
            ));
        }
        let code = params.code.ok_or_else(|| {
            AppError::Unauthorized("Redirect carried no authorization code".to_string())
        })?;

        exchange_code_for_session(client, &code, verifier.secret()).await
    }
}

async fn receive_callback(
    listener: TcpListener,
    timeout: Duration,
) -> Result<CallbackParams, AppError> {
    let (tx, rx) = oneshot::channel();
    let slot: CallbackSlot = Arc::new(Mutex::new(Some(tx)));
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let app = Router::new()
        .route(CALLBACK_PATH, get(callback))
        .with_state(slot);

    let server = tokio::spawn(async move {
        let shutdown = async {
            done_rx.await.ok();
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::warn!(error = %e, "OAuth redirect receiver failed");
        }
    });

    let result = tokio::time::timeout(timeout, rx).await;
    let _ = done_tx.send(());
    let _ = server.await;

    match result {
        Ok(Ok(params)) => Ok(params),
        Ok(Err(_)) => Err(AppError::Internal(
            "OAuth redirect receiver stopped".to_string(),
        )),
        Err(_) => Err(AppError::Transport(
            "Timed out waiting for the OAuth redirect".to_string(),
        )),
    }
}

async fn callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let failed = params.error.is_some();
    if let Some(tx) = slot.lock().await.take() {
        let _ = tx.send(params);
    }
    if failed {
        Html("<h1>Sign-in failed</h1><p>Return to the terminal for details.</p>")
    } else {
        Html("<h1>Signed in</h1><p>You can close this tab.</p>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn client() -> Option<BackendClient> {
        let config = Config::from_lookup(|key| match key {
            "SUPABASE_URL" => Some("http://127.0.0.1:9".to_string()),
            "SUPABASE_ANON_KEY" => Some("anon".to_string()),
            _ => None,
        })
        .ok()?;
        BackendClient::new(&config).ok()
    }

    #[tokio::test]
    async fn test_state_mismatch_is_rejected() {
        let Some(client) = client() else {
            unreachable!("client should build");
        };
        let Ok(pending) = begin(&client, OAuthProvider::Google, 0).await else {
            unreachable!("loopback bind should succeed");
        };
        assert!(pending.url.as_str().contains("code_challenge="));
        let addr = pending.local_addr().unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)));

        let redirect = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let url = format!("http://{addr}{CALLBACK_PATH}?code=abc&state=forged");
            reqwest::get(url).await.map(|r| r.status().is_success())
        };
        let (result, sent) = tokio::join!(pending.finish(&client, Duration::from_secs(5)), redirect);
        assert!(matches!(sent, Ok(true)));
        assert!(matches!(result, Err(AppError::Unauthorized(msg)) if msg.contains("state")));
    }

    #[tokio::test]
    async fn test_provider_error_is_reported() {
        let Some(client) = client() else {
            unreachable!("client should build");
        };
        let Ok(pending) = begin(&client, OAuthProvider::Apple, 0).await else {
            unreachable!("loopback bind should succeed");
        };
        let addr = pending.local_addr().unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)));

        let redirect = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let url = format!(
                "http://{addr}{CALLBACK_PATH}?error=access_denied&error_description=user+cancelled"
            );
            reqwest::get(url).await.map(|r| r.status().is_success())
        };
        let (result, _) = tokio::join!(pending.finish(&client, Duration::from_secs(5)), redirect);
        assert!(matches!(result, Err(AppError::Unauthorized(msg)) if msg.contains("access_denied")));
    }
}

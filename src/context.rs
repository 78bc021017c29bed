//! Explicit application context: configuration, backend client, the signed-in session and
//! identity, the room being viewed, and the shared room synchronizers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::auth::{SessionStore, read_claims};
use crate::backend::{BackendClient, auth, profiles};
use crate::config::Config;
use crate::dto::{RoomSummary, Session, User};
use crate::entities::Profile;
use crate::error::AppError;
use crate::realtime::Backoff;
use crate::sync::{LobbyFeed, RoomFeed, RoomState, SyncHandle, SyncRegistry, SyncStrategy, Synchronizer};

/// Refresh the access token when it expires within this many seconds.
pub const REFRESH_MARGIN_SECS: i64 = 60;

const AUTH_EVENT_CAPACITY: usize = 16;
const REFRESH_RETRY_INITIAL: Duration = Duration::from_secs(1);
const REFRESH_RETRY_MAX: Duration = Duration::from_secs(60);

/// Who is signed in, as shown to other players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    /// Profile username, else e-mail, else phone.
    pub display_name: String,
    pub avatar: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(user: &User, profile: Option<&Profile>) -> Self {
        let display_name = profile
            .and_then(|p| p.username.clone())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| user.fallback_name());
        Self {
            user_id: user.id,
            display_name,
            avatar: profile.and_then(|p| p.avatar.clone()),
        }
    }
}

/// Session-change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    TokenRefreshed,
    SignedOut,
    ProfileUpdated(Identity),
}

#[derive(Debug, Default)]
struct AuthState {
    session: Option<Session>,
    profile: Option<Profile>,
    identity: Option<Identity>,
}

pub struct AppContext {
    config: Config,
    client: BackendClient,
    store: SessionStore,
    auth: Arc<RwLock<AuthState>>,
    /// Stops the background token refresh of the installed session.
    refresher: Mutex<Option<DropGuard>>,
    current_room: RwLock<Option<Uuid>>,
    events: broadcast::Sender<AuthEvent>,
    rooms: SyncRegistry<RoomState>,
}

impl AppContext {
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be built from `config`.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let client = BackendClient::new(&config)?;
        let store = SessionStore::new(config.session_file.clone());
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            config,
            client,
            store,
            auth: Arc::new(RwLock::new(AuthState::default())),
            refresher: Mutex::new(None),
            current_room: RwLock::new(None),
            events,
            rooms: SyncRegistry::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn client(&self) -> &BackendClient {
        &self.client
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Restore the persisted session: refresh it if it is about to expire, validate it with
    /// the backend, and load the profile. A rejected session is cleared.
    ///
    /// # Errors
    ///
    /// Returns transport and unexpected backend errors; rejected credentials yield `Ok(None)`.
    pub async fn initialize(&self) -> Result<Option<Identity>, AppError> {
        let Some(mut session) = self.store.load().await else {
            tracing::debug!("no stored session");
            return Ok(None);
        };

        let mut refreshed = false;
        if session_expiring(&session, Utc::now().timestamp()) {
            match auth::refresh_session(&self.client, &session.refresh_token).await {
                Ok(fresh) => {
                    session = fresh;
                    refreshed = true;
                }
                Err(e) if is_rejection(&e) => {
                    tracing::info!(error = %e, "stored session expired");
                    self.clear_local().await?;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        let user = match auth::get_user(&self.client, &session.access_token).await {
            Ok(user) => user,
            Err(e) if is_rejection(&e) => {
                tracing::info!(error = %e, "stored session rejected");
                self.clear_local().await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        session.user = user;

        let identity = self.install(session).await?;
        if refreshed {
            self.emit(AuthEvent::TokenRefreshed);
        }
        tracing::info!(user_id = %identity.user_id, "session restored");
        Ok(Some(identity))
    }

    /// Adopt a freshly issued session: persist it, load the profile, notify `SignedIn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted.
    pub async fn establish(&self, session: Session) -> Result<Identity, AppError> {
        let identity = self.install(session).await?;
        tracing::info!(user_id = %identity.user_id, "signed in");
        self.emit(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn install(&self, session: Session) -> Result<Identity, AppError> {
        self.client
            .set_access_token(Some(session.access_token.clone()))
            .await;
        self.store.save(&session).await?;

        let profile = match profiles::get_profile(&self.client, session.user.id).await {
            Ok(profile) => Some(profile),
            Err(AppError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not load profile");
                None
            }
        };

        let identity = Identity::new(&session.user, profile.as_ref());
        {
            let mut state = self.auth.write().await;
            state.session = Some(session);
            state.profile = profile;
            state.identity = Some(identity.clone());
        }
        self.start_refresher().await;
        Ok(identity)
    }

    /// Replace the background refresher with one following the current session.
    async fn start_refresher(&self) {
        let stop = CancellationToken::new();
        let refresher = TokenRefresher {
            client: self.client.clone(),
            store: self.store.clone(),
            auth: Arc::clone(&self.auth),
            events: self.events.clone(),
            stop: stop.clone(),
        };
        *self.refresher.lock().await = Some(stop.drop_guard());
        tokio::spawn(refresher.run());
    }

    /// Replace the cached profile after an edit.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotAuthenticated`] when nobody is signed in.
    pub async fn set_profile(&self, profile: Profile) -> Result<Identity, AppError> {
        let identity = {
            let mut state = self.auth.write().await;
            let session = state.session.as_ref().ok_or(AppError::NotAuthenticated)?;
            let identity = Identity::new(&session.user, Some(&profile));
            state.profile = Some(profile);
            state.identity = Some(identity.clone());
            identity
        };
        self.emit(AuthEvent::ProfileUpdated(identity.clone()));
        Ok(identity)
    }

    /// Sign out: revoke the session remotely (best effort), then clear session, identity,
    /// current room, synchronizers and the persisted file.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted session cannot be removed.
    pub async fn teardown(&self) -> Result<(), AppError> {
        let token = self
            .auth
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.access_token.clone());
        if let Some(token) = token
            && let Err(e) = auth::sign_out(&self.client, &token).await
        {
            tracing::warn!(error = %e, "remote sign-out failed; clearing local session anyway");
        }
        self.clear_local().await?;
        tracing::info!("signed out");
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn clear_local(&self) -> Result<(), AppError> {
        self.refresher.lock().await.take();
        let mut state = self.auth.write().await;
        *state = AuthState::default();
        *self.current_room.write().await = None;
        self.rooms.clear();
        self.client.set_access_token(None).await;
        self.store.clear().await
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.auth.read().await.identity.clone()
    }

    /// # Errors
    ///
    /// Returns [`AppError::NotAuthenticated`] when nobody is signed in.
    pub async fn require_identity(&self) -> Result<Identity, AppError> {
        self.identity().await.ok_or(AppError::NotAuthenticated)
    }

    pub async fn session(&self) -> Option<Session> {
        self.auth.read().await.session.clone()
    }

    pub async fn profile(&self) -> Option<Profile> {
        self.auth.read().await.profile.clone()
    }

    pub async fn current_room(&self) -> Option<Uuid> {
        *self.current_room.read().await
    }

    pub async fn set_current_room(&self, room_id: Option<Uuid>) {
        *self.current_room.write().await = room_id;
    }

    /// The shared synchronizer for `room_id`, started on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured strategy cannot be built.
    pub async fn watch_room(&self, room_id: Uuid) -> Result<Arc<SyncHandle<RoomState>>, AppError> {
        let token = self.client.access_token().await;
        self.rooms.get_or_start(room_id, || {
            let strategy = SyncStrategy::from_config(&self.config, token)?;
            let feed = RoomFeed::new(self.client.clone(), room_id, self.config.chat_history_limit);
            Ok(Synchronizer::start(feed, strategy))
        })
    }

    /// A synchronizer over the waiting-room list.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured strategy cannot be built.
    pub async fn watch_lobby(&self) -> Result<SyncHandle<Vec<RoomSummary>>, AppError> {
        let token = self.client.access_token().await;
        let strategy = SyncStrategy::from_config(&self.config, token)?;
        Ok(Synchronizer::start(LobbyFeed::new(self.client.clone()), strategy))
    }

    #[must_use]
    pub fn active_room_syncs(&self) -> usize {
        self.rooms.active()
    }
}

/// Keeps the installed session's access token valid for as long as the context holds it.
struct TokenRefresher {
    client: BackendClient,
    store: SessionStore,
    auth: Arc<RwLock<AuthState>>,
    events: broadcast::Sender<AuthEvent>,
    stop: CancellationToken,
}

impl TokenRefresher {
    async fn run(self) {
        let mut backoff = Backoff::new(REFRESH_RETRY_INITIAL, REFRESH_RETRY_MAX);
        loop {
            let Some(session) = self.auth.read().await.session.clone() else {
                break;
            };
            let Some(expires_at) = session_expiry(&session) else {
                tracing::debug!("session has no expiry; not refreshing");
                break;
            };
            let wait = expires_at - REFRESH_MARGIN_SECS - Utc::now().timestamp();
            let wait = Duration::from_secs(u64::try_from(wait).unwrap_or(0));
            tokio::select! {
                () = self.stop.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }

            match auth::refresh_session(&self.client, &session.refresh_token).await {
                Ok(fresh) => {
                    backoff.reset();
                    if let Err(e) = self.adopt(&session.refresh_token, fresh).await {
                        tracing::warn!(error = %e, "could not persist refreshed session");
                    }
                }
                Err(e) if is_rejection(&e) => {
                    tracing::warn!(error = %e, "session refresh rejected; sign in again");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %e, attempt = backoff.attempt(), "session refresh failed");
                    tokio::select! {
                        () = self.stop.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        tracing::debug!("token refresher stopped");
    }

    /// Install `fresh` unless the session it replaces is gone (signed out or replaced).
    async fn adopt(&self, previous_refresh: &str, fresh: Session) -> Result<(), AppError> {
        let mut state = self.auth.write().await;
        let current = state.session.as_ref().map(|s| s.refresh_token.as_str());
        if self.stop.is_cancelled() || current != Some(previous_refresh) {
            return Ok(());
        }
        self.client
            .set_access_token(Some(fresh.access_token.clone()))
            .await;
        self.store.save(&fresh).await?;
        state.session = Some(fresh);
        drop(state);
        tracing::info!("access token refreshed");
        let _ = self.events.send(AuthEvent::TokenRefreshed);
        Ok(())
    }
}

/// Expiry of the access token: the server's `expires_at`, else the token's `exp` claim.
fn session_expiry(session: &Session) -> Option<i64> {
    session
        .expires_at
        .or_else(|| read_claims(&session.access_token).ok().map(|claims| claims.exp))
}

/// Whether the session's access token expires within [`REFRESH_MARGIN_SECS`].
fn session_expiring(session: &Session, now: i64) -> bool {
    session_expiry(session).is_none_or(|expires_at| expires_at - now <= REFRESH_MARGIN_SECS)
}

const fn is_rejection(err: &AppError) -> bool {
    matches!(err, AppError::Unauthorized(_) | AppError::NotFound(_))
        || matches!(err, AppError::Backend { status: 400, .. })
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;
    use crate::auth::Claims;

    fn user() -> User {
        User {
            id: Uuid::nil(),
            email: Some("sonny@corleone.it".to_string()),
            phone: None,
            user_metadata: serde_json::Value::Null,
        }
    }

    fn session(access_token: String, expires_at: Option<i64>) -> Session {
        Session {
            access_token,
            refresh_token: "r".to_string(),
            token_type: None,
            expires_in: None,
            expires_at,
            user: user(),
        }
    }

    #[test]
    fn test_identity_prefers_profile_username() {
        let profile = Profile {
            id: Uuid::nil(),
            email: None,
            username: Some("sonny".to_string()),
            name: None,
            age: None,
            gender: None,
            avatar: Some("char2".to_string()),
        };
        let identity = Identity::new(&user(), Some(&profile));
        assert_eq!(identity.display_name, "sonny");
        assert_eq!(identity.avatar.as_deref(), Some("char2"));

        let identity = Identity::new(&user(), None);
        assert_eq!(identity.display_name, "sonny@corleone.it");
    }

    #[test]
    fn test_session_expiring_uses_expires_at() {
        let now = 1_000_000;
        assert!(session_expiring(&session(String::new(), Some(now + 30)), now));
        assert!(!session_expiring(&session(String::new(), Some(now + 3600)), now));
    }

    #[test]
    fn test_session_expiring_falls_back_to_claims() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::nil().to_string(),
            exp: now + 3600,
            iat: Some(now),
            email: None,
            phone: None,
            role: Some("authenticated".to_string()),
            session_id: None,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k"))
            .unwrap_or_default();
        assert!(!session_expiring(&session(token, None), now));
        assert!(session_expiring(&session("garbage".to_string(), None), now));
    }

    #[test]
    fn test_rejections() {
        assert!(is_rejection(&AppError::Unauthorized("x".to_string())));
        assert!(!is_rejection(&AppError::Transport("x".to_string())));
    }
}

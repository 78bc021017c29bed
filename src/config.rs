use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::AppError;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: Url,
    pub anon_key: String,
    pub environment: Environment,
    pub log_level: String,
    pub sync_mode: SyncMode,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub chat_history_limit: usize,
    pub oauth_redirect_port: u16,
    pub session_file: PathBuf,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// How synchronizers keep their state current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Re-fetch on a fixed interval
    Poll,
    /// Subscribe to the change feed, re-fetch on events
    Push,
}

impl SyncMode {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(Self::Poll),
            "push" => Ok(Self::Push),
            other => Err(AppError::Config(format!(
                "SYNC_MODE must be `poll` or `push`, got `{other}`"
            ))),
        }
    }
}

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_CHAT_HISTORY_LIMIT: usize = 50;

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required: `SUPABASE_URL`, `SUPABASE_ANON_KEY`
    /// Optional with defaults: `ENVIRONMENT`, `LOG_LEVEL`, `SYNC_MODE`, `POLL_INTERVAL_MS`,
    /// `REQUEST_TIMEOUT_SECS`, `CHAT_HISTORY_LIMIT`, `OAUTH_REDIRECT_PORT`, `SESSION_FILE`
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let supabase_url = lookup("SUPABASE_URL")
            .ok_or_else(|| AppError::Config("SUPABASE_URL must be set".to_string()))?;
        let supabase_url = Url::parse(supabase_url.trim())
            .map_err(|e| AppError::Config(format!("SUPABASE_URL is not a valid URL: {e}")))?;

        let anon_key = lookup("SUPABASE_ANON_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::Config("SUPABASE_ANON_KEY must be set".to_string()))?;

        let environment = match lookup("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .as_str()
        {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        };

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let sync_mode = lookup("SYNC_MODE")
            .map_or(Ok(SyncMode::Poll), |value| SyncMode::parse(&value))?;

        let poll_interval_ms =
            parse_var(&lookup, "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?.max(100);
        let request_timeout_secs = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 10_u64)?;
        // A zero timeout fails every request before it is sent.
        if request_timeout_secs == 0 {
            return Err(AppError::Config(
                "REQUEST_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        let chat_history_limit =
            parse_var(&lookup, "CHAT_HISTORY_LIMIT", DEFAULT_CHAT_HISTORY_LIMIT)?;
        let oauth_redirect_port = parse_var(&lookup, "OAUTH_REDIRECT_PORT", 54321_u16)?;

        let session_file = lookup("SESSION_FILE")
            .map_or_else(|| PathBuf::from(".mafia-nights/session.json"), PathBuf::from);

        Ok(Self {
            supabase_url,
            anon_key,
            environment,
            log_level,
            sync_mode,
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            chat_history_limit,
            oauth_redirect_port,
            session_file,
        })
    }

    /// Base URL of the table API.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be joined.
    pub fn rest_url(&self) -> Result<Url, AppError> {
        Ok(self.supabase_url.join("rest/v1/")?)
    }

    /// Base URL of the auth API.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be joined.
    pub fn auth_url(&self) -> Result<Url, AppError> {
        Ok(self.supabase_url.join("auth/v1/")?)
    }

    /// Websocket URL of the change feed, with the API key and protocol version attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL has no host or cannot be converted to a websocket URL.
    pub fn realtime_url(&self) -> Result<Url, AppError> {
        let mut url = self.supabase_url.join("realtime/v1/websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| AppError::Config("SUPABASE_URL cannot carry a websocket scheme".into()))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: `{raw}`")))
    })
}

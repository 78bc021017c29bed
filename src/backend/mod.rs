//! Typed façade over the hosted backend.
//!
//! Every function performs exactly one remote operation and returns `Result<T, AppError>`:
//! no retries, no caching, no batching. Callers branch on the error variant.

pub mod auth;
pub mod chat;
pub mod diagnostics;
pub mod players;
pub mod profiles;
pub mod query;
pub mod rooms;

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use url::Url;

use crate::config::Config;
use crate::error::AppError;

pub use query::{Direction, Query};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_ROWS: &str = "return=representation";
const UPSERT_ROWS: &str = "resolution=merge-duplicates,return=representation";

/// HTTP client bound to one backend project.
///
/// Cheap to clone; clones share the connection pool and the current access token.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    rest_url: Url,
    auth_url: Url,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl BackendClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URLs are malformed or the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("mafia-nights/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            rest_url: config.rest_url()?,
            auth_url: config.auth_url()?,
            anon_key: config.anon_key.clone(),
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Use `token` (or the anonymous key when `None`) for subsequent requests.
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    #[must_use]
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    async fn bearer(&self) -> String {
        self.access_token()
            .await
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn with_keys(&self, builder: RequestBuilder, bearer: &str) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {bearer}"))
    }

    async fn table_request(
        &self,
        method: Method,
        table: &str,
        query: &Query,
    ) -> Result<RequestBuilder, AppError> {
        let url = self.rest_url.join(table)?;
        let bearer = self.bearer().await;
        Ok(self
            .with_keys(self.http.request(method, url), &bearer)
            .query(&query.to_pairs()))
    }

    /// Read all rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the classified backend error, or a transport error.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, AppError> {
        tracing::debug!(table, "select");
        let resp = self
            .table_request(Method::GET, table, query)
            .await?
            .send()
            .await?;
        read_json(resp).await
    }

    /// Read exactly one row; zero rows is [`AppError::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns the classified backend error, or a transport error.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<T, AppError> {
        tracing::debug!(table, "select single");
        let resp = self
            .table_request(Method::GET, table, query)
            .await?
            .header(ACCEPT, SINGLE_OBJECT)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Insert one row and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns the classified backend error, or a transport error.
    pub async fn insert<B, T>(&self, table: &str, row: &B) -> Result<T, AppError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(table, "insert");
        let resp = self
            .table_request(Method::POST, table, &Query::new())
            .await?
            .header(ACCEPT, SINGLE_OBJECT)
            .header("Prefer", HeaderValue::from_static(RETURN_ROWS))
            .json(row)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Insert or merge one row keyed by its primary key.
    ///
    /// # Errors
    ///
    /// Returns the classified backend error, or a transport error.
    pub async fn upsert<B, T>(&self, table: &str, row: &B) -> Result<T, AppError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(table, "upsert");
        let resp = self
            .table_request(Method::POST, table, &Query::new())
            .await?
            .header(ACCEPT, SINGLE_OBJECT)
            .header("Prefer", HeaderValue::from_static(UPSERT_ROWS))
            .json(row)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Update the single row matching `query` and return it.
    ///
    /// # Errors
    ///
    /// Refuses unfiltered updates; otherwise returns the classified backend error.
    pub async fn update<B, T>(&self, table: &str, query: &Query, changes: &B) -> Result<T, AppError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        if !query.has_filters() {
            return Err(AppError::Internal(format!(
                "refusing unfiltered update on {table}"
            )));
        }
        tracing::debug!(table, "update");
        let resp = self
            .table_request(Method::PATCH, table, query)
            .await?
            .header(ACCEPT, SINGLE_OBJECT)
            .header("Prefer", HeaderValue::from_static(RETURN_ROWS))
            .json(changes)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Delete the rows matching `query`.
    ///
    /// # Errors
    ///
    /// Refuses unfiltered deletes; otherwise returns the classified backend error.
    pub async fn delete(&self, table: &str, query: &Query) -> Result<(), AppError> {
        if !query.has_filters() {
            return Err(AppError::Internal(format!(
                "refusing unfiltered delete on {table}"
            )));
        }
        tracing::debug!(table, "delete");
        let resp = self
            .table_request(Method::DELETE, table, query)
            .await?
            .send()
            .await?;
        read_empty(resp).await
    }

    /// Call a server-side procedure.
    ///
    /// # Errors
    ///
    /// Returns the classified backend error, or a transport error.
    pub async fn rpc<A, T>(&self, function: &str, args: &A) -> Result<T, AppError>
    where
        A: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(function, "rpc");
        let url = self.rest_url.join(&format!("rpc/{function}"))?;
        let bearer = self.bearer().await;
        let resp = self
            .with_keys(self.http.post(url), &bearer)
            .json(args)
            .send()
            .await?;
        read_json(resp).await
    }

    pub(crate) fn auth_endpoint(&self, path: &str) -> Result<Url, AppError> {
        Ok(self.auth_url.join(path)?)
    }

    /// Request against the auth service, authorized with `token` or the anonymous key.
    pub(crate) fn auth_request(
        &self,
        method: Method,
        url: Url,
        token: Option<&str>,
    ) -> RequestBuilder {
        let bearer = token.unwrap_or(&self.anon_key);
        self.with_keys(self.http.request(method, url), bearer)
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, AppError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let err = AppError::from_response(status, &body);
        tracing::debug!(%status, error = %err, "backend error");
        return Err(err);
    }
    Ok(serde_json::from_str(&body)?)
}

pub(crate) async fn read_empty(resp: Response) -> Result<(), AppError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await?;
    Err(AppError::from_response(status, &body))
}

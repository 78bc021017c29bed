#![allow(dead_code)]

//! In-process stand-in for the hosted backend: table API, auth API, the setup procedure and
//! the realtime websocket, all on one loopback port.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use mafia_nights::AppContext;
use mafia_nights::auth::Claims;
use mafia_nights::config::Config;
use mafia_nights::context::Identity;
use mafia_nights::services::AuthService;

/// The only one-time code the fake accepts.
pub const OTP_CODE: &str = "123456";
/// The only authorization code the fake's PKCE exchange accepts.
pub const OAUTH_CODE: &str = "fake-auth-code";
pub const PASSWORD: &str = "hunter22";

const TOKEN_SECRET: &[u8] = b"fake-backend-secret";
const TABLES: [&str; 4] = ["profiles", "game_rooms", "game_players", "chat_messages"];

type Shared = Arc<FakeState>;

#[derive(Debug, Clone)]
struct FakeUser {
    id: Uuid,
    email: Option<String>,
    phone: Option<String>,
    password: Option<String>,
    metadata: Value,
}

impl FakeUser {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "email": self.email,
            "phone": self.phone,
            "user_metadata": self.metadata,
        })
    }
}

#[derive(Debug, Clone)]
enum Push {
    Change {
        table: String,
        kind: &'static str,
        record: Value,
        old_record: Value,
    },
    Disconnect,
}

#[derive(Default)]
struct Db {
    tables: HashMap<String, Vec<Value>>,
    users: Vec<FakeUser>,
    access_tokens: HashMap<String, Uuid>,
    refresh_tokens: HashMap<String, Uuid>,
    last_micros: i64,
    /// Access-token lifetime in seconds; 3600 when unset.
    token_lifetime: Option<i64>,
}

impl Db {
    /// Strictly increasing timestamps so creation order is also sort order.
    fn next_timestamp(&mut self) -> String {
        let micros = Utc::now().timestamp_micros().max(self.last_micros + 1);
        self.last_micros = micros;
        DateTime::<Utc>::from_timestamp_micros(micros)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn issue_session(&mut self, user: &FakeUser) -> Value {
        let now = Utc::now().timestamp();
        let lifetime = self.token_lifetime.unwrap_or(3600);
        let claims = Claims {
            sub: user.id.to_string(),
            exp: now + lifetime,
            iat: Some(now),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: Some("authenticated".to_string()),
            session_id: Some(Uuid::new_v4().to_string()),
        };
        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TOKEN_SECRET),
        )
        .unwrap_or_default();
        let refresh_token = Uuid::new_v4().simple().to_string();
        self.access_tokens.insert(access_token.clone(), user.id);
        self.refresh_tokens.insert(refresh_token.clone(), user.id);
        json!({
            "access_token": access_token,
            "refresh_token": refresh_token,
            "token_type": "bearer",
            "expires_in": lifetime,
            "expires_at": now + lifetime,
            "user": user.to_json(),
        })
    }
}

pub struct FakeState {
    db: Mutex<Db>,
    pushes: broadcast::Sender<Push>,
    joined_topics: Mutex<Vec<String>>,
    rest_requests: AtomicUsize,
    socket_connections: AtomicUsize,
    confirm_signups: AtomicBool,
    setup_installed: AtomicBool,
    outage: AtomicBool,
}

impl FakeState {
    fn publish(&self, table: &str, kind: &'static str, record: Value, old_record: Value) {
        // Nobody listening is fine.
        let _ = self.pushes.send(Push::Change {
            table: table.to_string(),
            kind,
            record,
            old_record,
        });
    }
}

pub struct FakeBackend {
    pub url: String,
    state: Shared,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let (pushes, _) = broadcast::channel(256);
        let state = Arc::new(FakeState {
            db: Mutex::new(Db::default()),
            pushes,
            joined_topics: Mutex::new(Vec::new()),
            rest_requests: AtomicUsize::new(0),
            socket_connections: AtomicUsize::new(0),
            confirm_signups: AtomicBool::new(false),
            setup_installed: AtomicBool::new(true),
            outage: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/rest/v1/rpc/{function}", post(rpc))
            .route("/rest/v1/{table}", any(table_api))
            .route("/auth/v1/signup", post(signup))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/otp", post(otp))
            .route("/auth/v1/verify", post(verify))
            .route("/auth/v1/user", get(user))
            .route("/auth/v1/logout", post(logout))
            .route("/realtime/v1/websocket", get(websocket))
            .with_state(Arc::clone(&state));

        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            unreachable!("loopback bind should succeed");
        };
        let Ok(addr) = listener.local_addr() else {
            unreachable!("bound listener has an address");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// Client configuration pointing at this backend, with its own session file.
    pub fn config(&self, sync_mode: &str) -> Config {
        let session_file = std::env::temp_dir()
            .join(format!("mafia-nights-test-{}", Uuid::new_v4()))
            .join("session.json");
        let vars: HashMap<&str, String> = HashMap::from([
            ("SUPABASE_URL", self.url.clone()),
            ("SUPABASE_ANON_KEY", "anon".to_string()),
            ("SYNC_MODE", sync_mode.to_string()),
            ("POLL_INTERVAL_MS", "100".to_string()),
            ("REQUEST_TIMEOUT_SECS", "5".to_string()),
            ("OAUTH_REDIRECT_PORT", "0".to_string()),
            ("SESSION_FILE", session_file.display().to_string()),
        ]);
        let Ok(config) = Config::from_lookup(|key| vars.get(key).cloned()) else {
            unreachable!("test config should load");
        };
        config
    }

    pub fn context(&self, sync_mode: &str) -> AppContext {
        self.context_with(self.config(sync_mode))
    }

    pub fn context_with(&self, config: Config) -> AppContext {
        let Ok(ctx) = AppContext::new(config) else {
            unreachable!("context should build");
        };
        ctx
    }

    /// A fresh signed-in user whose display name is `username`.
    pub async fn signed_in(&self, username: &str, sync_mode: &str) -> (AppContext, Identity) {
        let ctx = self.context(sync_mode);
        let email = format!("{username}-{}@mafia.test", Uuid::new_v4().simple());
        let result =
            AuthService::sign_up(&ctx, &email, PASSWORD, PASSWORD, Some(username)).await;
        let Ok(Some(identity)) = result else {
            unreachable!("sign-up should sign in: {result:?}");
        };
        (ctx, identity)
    }

    pub fn require_email_confirmation(&self, on: bool) {
        self.state.confirm_signups.store(on, Ordering::SeqCst);
    }

    pub fn set_setup_installed(&self, on: bool) {
        self.state.setup_installed.store(on, Ordering::SeqCst);
    }

    /// While on, every table request fails with 503.
    pub fn set_outage(&self, on: bool) {
        self.state.outage.store(on, Ordering::SeqCst);
    }

    pub fn rest_requests(&self) -> usize {
        self.state.rest_requests.load(Ordering::SeqCst)
    }

    pub fn socket_connections(&self) -> usize {
        self.state.socket_connections.load(Ordering::SeqCst)
    }

    /// Issue access tokens that expire `secs` after sign-in.
    pub async fn set_token_lifetime(&self, secs: i64) {
        self.state.db.lock().await.token_lifetime = Some(secs);
    }

    /// Revoke every refresh token, as a password change on another device would.
    pub async fn revoke_refresh_tokens(&self) {
        self.state.db.lock().await.refresh_tokens.clear();
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .db
            .lock()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Write a row as another client would, including the change notification.
    pub async fn insert_row(&self, table: &str, row: Value) -> Value {
        let mut db = self.state.db.lock().await;
        let mut row = row;
        fill_defaults(&mut db, table, &mut row);
        db.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        drop(db);
        self.state.publish(table, "INSERT", row.clone(), Value::Null);
        row
    }

    /// Close every open change-feed socket from the server side.
    pub fn disconnect_sockets(&self) {
        let _ = self.state.pushes.send(Push::Disconnect);
    }

    pub async fn joined_topics(&self) -> Vec<String> {
        self.state.joined_topics.lock().await.clone()
    }

    /// Wait until `topic` has been joined `times` times in total.
    pub async fn wait_for_join(&self, topic: &str, times: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            let joined = self
                .joined_topics()
                .await
                .iter()
                .filter(|t| t.as_str() == topic)
                .count();
            if joined >= times {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

fn error(status: StatusCode, body: &Value) -> Response {
    (status, Json(body.clone())).into_response()
}

fn rest_error(status: StatusCode, code: &str, message: &str) -> Response {
    error(
        status,
        &json!({ "code": code, "message": message, "details": null, "hint": null }),
    )
}

fn auth_error(status: StatusCode, code: &str, message: &str) -> Response {
    error(
        status,
        &json!({ "code": status.as_u16(), "error_code": code, "msg": message }),
    )
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Column value as it appears in a filter.
fn cell(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "null".to_string(),
        Some(other) => other.to_string(),
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn rpc(State(state): State<Shared>, Path(function): Path<String>) -> Response {
    state.rest_requests.fetch_add(1, Ordering::SeqCst);
    if function != "check_game_setup" || !state.setup_installed.load(Ordering::SeqCst) {
        return rest_error(
            StatusCode::NOT_FOUND,
            "PGRST202",
            &format!("Could not find the function public.{function} in the schema cache"),
        );
    }
    Json(json!({ "status": "ok", "message": "All game tables are installed" })).into_response()
}

fn fill_defaults(db: &mut Db, table: &str, row: &mut Value) {
    let now = db.next_timestamp();
    let Some(obj) = row.as_object_mut() else {
        return;
    };
    obj.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
    match table {
        "game_rooms" => {
            obj.entry("created_at").or_insert_with(|| json!(now));
            obj.entry("updated_at").or_insert_with(|| json!(now));
        }
        "game_players" => {
            obj.entry("joined_at").or_insert_with(|| json!(now));
            obj.entry("is_alive").or_insert(Value::Bool(true));
            obj.entry("role").or_insert(Value::Null);
        }
        "chat_messages" => {
            obj.entry("created_at").or_insert_with(|| json!(now));
        }
        _ => {}
    }
}

/// Whether `row` collides with a unique key of another row.
fn violates_unique(table: &str, rows: &[Value], row: &Value) -> bool {
    let id = cell(row, "id");
    rows.iter().filter(|other| cell(other, "id") != id).any(|other| match table {
        "game_rooms" => cell(other, "code") == cell(row, "code"),
        "game_players" => {
            cell(other, "room_id") == cell(row, "room_id")
                && cell(other, "user_id") == cell(row, "user_id")
        }
        "profiles" => {
            let username = cell(row, "username");
            username != "null" && cell(other, "username") == username
        }
        _ => false,
    })
}

fn merge_into(target: &mut Value, changes: &Value) {
    if let (Some(target), Some(changes)) = (target.as_object_mut(), changes.as_object()) {
        for (key, value) in changes {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn respond(rows: Vec<Value>, single: bool) -> Response {
    if !single {
        return Json(Value::Array(rows)).into_response();
    }
    match <[Value; 1]>::try_from(rows) {
        Ok([row]) => Json(row).into_response(),
        Err(_) => rest_error(
            StatusCode::NOT_ACCEPTABLE,
            "PGRST116",
            "JSON object requested, multiple (or no) rows returned",
        ),
    }
}

async fn table_api(
    State(state): State<Shared>,
    Path(table): Path<String>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    state.rest_requests.fetch_add(1, Ordering::SeqCst);
    if headers.get("apikey").is_none() {
        return rest_error(StatusCode::UNAUTHORIZED, "PGRST301", "No API key found");
    }
    if state.outage.load(Ordering::SeqCst) {
        return rest_error(StatusCode::SERVICE_UNAVAILABLE, "PGRST000", "Database unavailable");
    }
    if !TABLES.contains(&table.as_str()) {
        return rest_error(
            StatusCode::NOT_FOUND,
            "PGRST205",
            &format!("Could not find the table 'public.{table}' in the schema cache"),
        );
    }

    let single = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("vnd.pgrst.object"));
    let upsert = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("merge-duplicates"));
    let filters: Vec<(String, String)> = params
        .iter()
        .filter_map(|(key, value)| Some((key.clone(), value.strip_prefix("eq.")?.to_string())))
        .filter(|(key, _)| !matches!(key.as_str(), "select" | "order" | "limit"))
        .collect();
    let matches = |row: &Value| filters.iter().all(|(col, val)| &cell(row, col) == val);

    let mut db = state.db.lock().await;
    match method {
        Method::GET => {
            let mut rows: Vec<Value> = db
                .tables
                .get(&table)
                .map(|rows| rows.iter().filter(|r| matches(r)).cloned().collect())
                .unwrap_or_default();
            for (key, value) in &params {
                if key == "order"
                    && let Some((column, direction)) = value.split_once('.')
                {
                    rows.sort_by_key(|r| cell(r, column));
                    if direction == "desc" {
                        rows.reverse();
                    }
                }
            }
            if let Some(limit) = params
                .iter()
                .find(|(key, _)| key == "limit")
                .and_then(|(_, value)| value.parse::<usize>().ok())
            {
                rows.truncate(limit);
            }
            respond(rows, single)
        }
        Method::POST => {
            let Ok(mut row) = serde_json::from_slice::<Value>(&body) else {
                return rest_error(StatusCode::BAD_REQUEST, "PGRST102", "Invalid JSON body");
            };
            fill_defaults(&mut db, &table, &mut row);
            let rows = db.tables.entry(table.clone()).or_default();
            if violates_unique(&table, rows, &row) {
                return rest_error(
                    StatusCode::CONFLICT,
                    "23505",
                    "duplicate key value violates unique constraint",
                );
            }
            let id = cell(&row, "id");
            let existing = rows.iter_mut().find(|r| cell(r, "id") == id);
            let (stored, kind, old) = match existing {
                Some(current) if upsert => {
                    let old = current.clone();
                    merge_into(current, &row);
                    (current.clone(), "UPDATE", old)
                }
                Some(_) => {
                    return rest_error(
                        StatusCode::CONFLICT,
                        "23505",
                        "duplicate key value violates unique constraint",
                    );
                }
                None => {
                    rows.push(row.clone());
                    (row, "INSERT", Value::Null)
                }
            };
            drop(db);
            state.publish(&table, kind, stored.clone(), old);
            respond(vec![stored], single)
        }
        Method::PATCH => {
            let Ok(changes) = serde_json::from_slice::<Value>(&body) else {
                return rest_error(StatusCode::BAD_REQUEST, "PGRST102", "Invalid JSON body");
            };
            let mut updated = Vec::new();
            if let Some(rows) = db.tables.get_mut(&table) {
                for row in rows.iter_mut().filter(|r| matches(r)) {
                    let old = row.clone();
                    merge_into(row, &changes);
                    updated.push((row.clone(), old));
                }
            }
            drop(db);
            for (row, old) in &updated {
                state.publish(&table, "UPDATE", row.clone(), old.clone());
            }
            respond(updated.into_iter().map(|(row, _)| row).collect(), single)
        }
        Method::DELETE => {
            let mut removed = Vec::new();
            if let Some(rows) = db.tables.get_mut(&table) {
                let (gone, kept): (Vec<Value>, Vec<Value>) =
                    rows.drain(..).partition(|r| matches(r));
                *rows = kept;
                removed.extend(gone.into_iter().map(|row| (table.clone(), row)));
            }
            // Seats and chat go with their room.
            if table == "game_rooms" {
                let room_ids: Vec<String> = removed.iter().map(|(_, r)| cell(r, "id")).collect();
                for child in ["game_players", "chat_messages"] {
                    if let Some(rows) = db.tables.get_mut(child) {
                        let (gone, kept): (Vec<Value>, Vec<Value>) = rows
                            .drain(..)
                            .partition(|r| room_ids.contains(&cell(r, "room_id")));
                        *rows = kept;
                        removed.extend(gone.into_iter().map(|row| (child.to_string(), row)));
                    }
                }
            }
            drop(db);
            for (table, row) in removed {
                state.publish(&table, "DELETE", Value::Null, row);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn signup(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let email = text(&body, "email");
    let mut db = state.db.lock().await;
    if db.users.iter().any(|u| u.email.as_deref() == Some(email.as_str())) {
        return auth_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "user_already_exists",
            "User already registered",
        );
    }
    let user = FakeUser {
        id: Uuid::new_v4(),
        email: Some(email),
        phone: None,
        password: Some(text(&body, "password")),
        metadata: body.get("data").cloned().unwrap_or_else(|| json!({})),
    };
    db.users.push(user.clone());
    if state.confirm_signups.load(Ordering::SeqCst) {
        return Json(user.to_json()).into_response();
    }
    Json(db.issue_session(&user)).into_response()
}

async fn token(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut db = state.db.lock().await;
    let grant = params.get("grant_type").map(String::as_str).unwrap_or_default();
    let user = match grant {
        "password" => {
            let email = text(&body, "email");
            let password = text(&body, "password");
            db.users
                .iter()
                .find(|u| {
                    u.email.as_deref() == Some(email.as_str())
                        && u.password.as_deref() == Some(password.as_str())
                })
                .cloned()
        }
        "refresh_token" => {
            let refresh = text(&body, "refresh_token");
            db.refresh_tokens
                .remove(&refresh)
                .and_then(|id| db.users.iter().find(|u| u.id == id).cloned())
        }
        "pkce" => {
            let verifier = text(&body, "code_verifier");
            if text(&body, "auth_code") == OAUTH_CODE && verifier.len() >= 43 {
                let existing = db
                    .users
                    .iter()
                    .find(|u| u.email.as_deref() == Some("oauth@mafia.test"))
                    .cloned();
                Some(existing.unwrap_or_else(|| {
                    let user = FakeUser {
                        id: Uuid::new_v4(),
                        email: Some("oauth@mafia.test".to_string()),
                        phone: None,
                        password: None,
                        metadata: json!({ "full_name": "Oauth Player" }),
                    };
                    db.users.push(user.clone());
                    user
                }))
            } else {
                None
            }
        }
        _ => None,
    };
    match user {
        Some(user) => Json(db.issue_session(&user)).into_response(),
        None => error(
            StatusCode::BAD_REQUEST,
            &json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" }),
        ),
    }
}

async fn otp(Json(body): Json<Value>) -> Response {
    if text(&body, "phone").len() < 12 {
        return auth_error(StatusCode::BAD_REQUEST, "validation_failed", "Invalid phone");
    }
    Json(json!({})).into_response()
}

async fn verify(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    if text(&body, "token") != OTP_CODE {
        return auth_error(
            StatusCode::FORBIDDEN,
            "otp_expired",
            "Token has expired or is invalid",
        );
    }
    let phone = text(&body, "phone");
    let mut db = state.db.lock().await;
    let existing = db
        .users
        .iter()
        .find(|u| u.phone.as_deref() == Some(phone.as_str()))
        .cloned();
    let user = existing.unwrap_or_else(|| {
        let user = FakeUser {
            id: Uuid::new_v4(),
            email: None,
            phone: Some(phone),
            password: None,
            metadata: json!({}),
        };
        db.users.push(user.clone());
        user
    });
    Json(db.issue_session(&user)).into_response()
}

async fn user(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let db = state.db.lock().await;
    let found = bearer(&headers)
        .and_then(|token| db.access_tokens.get(&token).copied())
        .and_then(|id| db.users.iter().find(|u| u.id == id));
    match found {
        Some(user) => Json(user.to_json()).into_response(),
        None => auth_error(StatusCode::UNAUTHORIZED, "bad_jwt", "invalid JWT"),
    }
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer(&headers) {
        state.db.lock().await.access_tokens.remove(&token);
    }
    StatusCode::NO_CONTENT.into_response()
}

struct Channel {
    topic: String,
    table: String,
    event: String,
    filter: Option<(String, String)>,
}

impl Channel {
    fn from_join(topic: &str, frame: &Value) -> Self {
        let change = frame
            .pointer("/payload/config/postgres_changes/0")
            .cloned()
            .unwrap_or(Value::Null);
        let filter = change
            .get("filter")
            .and_then(Value::as_str)
            .and_then(|f| {
                let (column, rest) = f.split_once('=')?;
                Some((column.to_string(), rest.strip_prefix("eq.")?.to_string()))
            });
        Self {
            topic: topic.to_string(),
            table: text(&change, "table"),
            event: change
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or("*")
                .to_string(),
            filter,
        }
    }

    fn wants(&self, table: &str, kind: &str, record: &Value, old_record: &Value) -> bool {
        if self.table != table || (self.event != "*" && self.event != kind) {
            return false;
        }
        let row = if kind == "DELETE" { old_record } else { record };
        self.filter
            .as_ref()
            .is_none_or(|(column, value)| &cell(row, column) == value)
    }
}

fn reply(topic: &str, reference: &Value) -> Message {
    let frame = json!({
        "topic": topic,
        "event": "phx_reply",
        "payload": { "status": "ok", "response": {} },
        "ref": reference,
    });
    Message::Text(frame.to_string().into())
}

async fn websocket(State(state): State<Shared>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: Shared, socket: WebSocket) {
    state.socket_connections.fetch_add(1, Ordering::SeqCst);
    let mut pushes = state.pushes.subscribe();
    let (mut sink, mut stream) = socket.split();
    let mut channels: Vec<Channel> = Vec::new();

    loop {
        tokio::select! {
            inbound = stream.next() => {
                let Some(Ok(message)) = inbound else { break };
                let frame = match message {
                    Message::Text(text) => serde_json::from_str::<Value>(text.as_str()).unwrap_or_default(),
                    Message::Close(_) => break,
                    _ => continue,
                };
                let topic = text(&frame, "topic");
                let reference = frame.get("ref").cloned().unwrap_or(Value::Null);
                match text(&frame, "event").as_str() {
                    "phx_join" => {
                        channels.push(Channel::from_join(&topic, &frame));
                        state.joined_topics.lock().await.push(topic.clone());
                    }
                    "phx_leave" => channels.retain(|c| c.topic != topic),
                    "heartbeat" => {}
                    _ => continue,
                }
                if sink.send(reply(&topic, &reference)).await.is_err() {
                    break;
                }
            }
            push = pushes.recv() => match push {
                Ok(Push::Change { table, kind, record, old_record }) => {
                    for channel in channels.iter().filter(|c| c.wants(&table, kind, &record, &old_record)) {
                        let frame = json!({
                            "topic": channel.topic,
                            "event": "postgres_changes",
                            "payload": {
                                "data": {
                                    "schema": "public",
                                    "table": table,
                                    "type": kind,
                                    "commit_timestamp": Utc::now().to_rfc3339(),
                                    "record": record,
                                    "old_record": old_record,
                                },
                                "ids": [1],
                            },
                            "ref": null,
                        });
                        if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(Push::Disconnect) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => {}
            },
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

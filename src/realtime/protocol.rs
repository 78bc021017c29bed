//! Phoenix channel frames spoken by the backend's realtime websocket.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic used for connection-level heartbeats.
pub const HEARTBEAT_TOPIC: &str = "phoenix";

/// One row-change subscription: a table, an event kind (`*` for all) and an optional row filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub name: String,
    pub table: String,
    pub event: String,
    pub filter: Option<String>,
}

impl Subscription {
    /// Every change on `table`.
    #[must_use]
    pub fn all(name: impl Into<String>, table: &str) -> Self {
        Self {
            name: name.into(),
            table: table.to_string(),
            event: "*".to_string(),
            filter: None,
        }
    }

    #[must_use]
    pub fn on(mut self, event: ChangeKind) -> Self {
        self.event = event.as_str().to_string();
        self
    }

    /// Restrict to rows where `column` equals `value`.
    #[must_use]
    pub fn filter_eq(mut self, column: &str, value: impl fmt::Display) -> Self {
        self.filter = Some(format!("{column}=eq.{value}"));
        self
    }

    #[must_use]
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// A row-level change delivered on a joined channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub topic: String,
    pub table: String,
    pub kind: ChangeKind,
    pub record: Option<Value>,
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    /// The new row decoded as `T`, if present and well-formed.
    #[must_use]
    pub fn record_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.record
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    topic: &'a str,
    event: &'a str,
    payload: T,
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Serialize)]
struct EmptyPayload {}

#[derive(Serialize)]
struct JoinPayload<'a> {
    config: JoinConfig<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
}

#[derive(Serialize)]
struct JoinConfig<'a> {
    postgres_changes: [PostgresChange<'a>; 1],
}

#[derive(Serialize)]
struct PostgresChange<'a> {
    event: &'a str,
    schema: &'a str,
    table: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
}

/// # Errors
///
/// Returns an error if the frame cannot be serialized.
pub fn join_frame(
    subscription: &Subscription,
    access_token: Option<&str>,
    reference: u64,
) -> serde_json::Result<String> {
    let topic = subscription.topic();
    serde_json::to_string(&Envelope {
        topic: &topic,
        event: "phx_join",
        payload: JoinPayload {
            config: JoinConfig {
                postgres_changes: [PostgresChange {
                    event: &subscription.event,
                    schema: "public",
                    table: &subscription.table,
                    filter: subscription.filter.as_deref(),
                }],
            },
            access_token,
        },
        reference: reference.to_string(),
    })
}

/// # Errors
///
/// Returns an error if the frame cannot be serialized.
pub fn heartbeat_frame(reference: u64) -> serde_json::Result<String> {
    serde_json::to_string(&Envelope {
        topic: HEARTBEAT_TOPIC,
        event: "heartbeat",
        payload: EmptyPayload {},
        reference: reference.to_string(),
    })
}

/// # Errors
///
/// Returns an error if the frame cannot be serialized.
pub fn leave_frame(topic: &str, reference: u64) -> serde_json::Result<String> {
    serde_json::to_string(&Envelope {
        topic,
        event: "phx_leave",
        payload: EmptyPayload {},
        reference: reference.to_string(),
    })
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a join (or heartbeat); `ok` is false when the server refused it.
    Reply {
        topic: String,
        ok: bool,
        reason: Option<String>,
    },
    Change(ChangeEvent),
    /// The server closed or errored a channel.
    ChannelClosed { topic: String },
    Other { topic: String, event: String },
}

#[derive(Deserialize)]
struct RawFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct ReplyPayload {
    status: String,
    #[serde(default)]
    response: Value,
}

#[derive(Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Deserialize)]
struct ChangeData {
    table: String,
    #[serde(rename = "type", alias = "eventType")]
    kind: ChangeKind,
    #[serde(default, alias = "new")]
    record: Option<Value>,
    #[serde(default, alias = "old")]
    old_record: Option<Value>,
}

/// # Errors
///
/// Returns an error for frames that are not valid JSON envelopes or carry a malformed
/// change payload.
pub fn parse_frame(text: &str) -> serde_json::Result<Inbound> {
    let frame: RawFrame = serde_json::from_str(text)?;
    Ok(match frame.event.as_str() {
        "phx_reply" => {
            let reply: ReplyPayload = serde_json::from_value(frame.payload)?;
            let reason = reply
                .response
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string);
            Inbound::Reply {
                topic: frame.topic,
                ok: reply.status == "ok",
                reason,
            }
        }
        "postgres_changes" => {
            let change: ChangePayload = serde_json::from_value(frame.payload)?;
            Inbound::Change(ChangeEvent {
                topic: frame.topic,
                table: change.data.table,
                kind: change.data.kind,
                record: change.data.record.filter(|v| !v.is_null()),
                old_record: change.data.old_record.filter(|v| !v.is_null()),
            })
        }
        "phx_close" | "phx_error" => Inbound::ChannelClosed { topic: frame.topic },
        _ => Inbound::Other {
            topic: frame.topic,
            event: frame.event,
        },
    })
}

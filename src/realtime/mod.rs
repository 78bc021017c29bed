//! Change-feed client for the backend's realtime websocket.
//!
//! One connection carries one channel per [`Subscription`]. Row changes are forwarded as
//! [`FeedSignal::Change`] once the channel's join is acknowledged; a dropped connection is
//! re-established with exponential backoff. Once all joins of a session are answered the feed
//! says so with [`FeedSignal::Subscribed`], or [`FeedSignal::Reconnected`] after a drop.

pub mod backoff;
pub mod protocol;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::error::AppError;

pub use backoff::Backoff;
pub use protocol::{ChangeEvent, ChangeKind, Inbound, Subscription};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: Url,
    /// User access token for row-level security; the anonymous key applies when `None`.
    pub access_token: Option<String>,
    pub handshake_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub channel_capacity: usize,
}

impl RealtimeConfig {
    #[must_use]
    pub fn new(url: Url, access_token: Option<String>) -> Self {
        Self {
            url,
            access_token,
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(25),
            backoff_initial: backoff::INITIAL_DELAY,
            backoff_max: backoff::MAX_DELAY,
            channel_capacity: 64,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the websocket URL cannot be derived from the backend URL.
    pub fn from_config(config: &Config, access_token: Option<String>) -> Result<Self, AppError> {
        Ok(Self::new(config.realtime_url()?, access_token))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    Change(ChangeEvent),
    /// Every join of the first session was answered. Changes made before the joins were
    /// acknowledged are not delivered.
    Subscribed,
    /// The connection was re-established; events may have been missed meanwhile.
    Reconnected,
}

/// Handle to a running change feed. The connection closes when `stop` is cancelled or
/// the signal receiver is dropped.
pub struct ChangeFeed {
    cfg: RealtimeConfig,
    subscriptions: Vec<Subscription>,
    tx: mpsc::Sender<FeedSignal>,
    stop: CancellationToken,
    next_ref: u64,
}

enum SessionEnd {
    Stopped,
    Dropped { joined: bool },
}

impl ChangeFeed {
    /// Spawn the feed on the current runtime.
    pub fn spawn(
        cfg: RealtimeConfig,
        subscriptions: Vec<Subscription>,
        stop: CancellationToken,
    ) -> (JoinHandle<()>, mpsc::Receiver<FeedSignal>) {
        let (tx, rx) = mpsc::channel(cfg.channel_capacity.max(1));
        let feed = Self {
            cfg,
            subscriptions,
            tx,
            stop,
            next_ref: 0,
        };
        (tokio::spawn(feed.run()), rx)
    }

    async fn run(mut self) {
        tracing::info!(
            url = %redacted(&self.cfg.url),
            channels = self.subscriptions.len(),
            "starting change feed"
        );
        let mut backoff = Backoff::new(self.cfg.backoff_initial, self.cfg.backoff_max);
        let mut connected_before = false;

        while !self.stop.is_cancelled() {
            let end = match self.connect().await {
                Ok(stream) => self.pump(stream, connected_before).await,
                Err(e) => {
                    tracing::warn!(error = %e, attempt = backoff.attempt(), "change feed connect failed");
                    Ok(SessionEnd::Dropped { joined: false })
                }
            };

            match end {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Dropped { joined }) => {
                    if joined {
                        connected_before = true;
                        backoff.reset();
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "change feed session failed");
                }
            }

            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis(), attempt = backoff.attempt(), "reconnecting change feed");
            tokio::select! {
                () = self.stop.cancelled() => break,
                () = sleep(delay) => {}
            }
        }

        tracing::info!("change feed stopped");
    }

    async fn connect(&self) -> Result<WsStream> {
        let connect = connect_async(self.cfg.url.as_str());
        let (stream, _) = tokio::select! {
            () = self.stop.cancelled() => return Err(anyhow!("stopped during handshake")),
            result = timeout(self.cfg.handshake_timeout, connect) => result
                .context("realtime handshake timed out")?
                .context("realtime handshake failed")?,
        };
        Ok(stream)
    }

    fn reference(&mut self) -> u64 {
        self.next_ref += 1;
        self.next_ref
    }

    async fn pump(&mut self, stream: WsStream, resync: bool) -> Result<SessionEnd> {
        let (mut sink, mut source) = stream.split();

        let mut pending: HashSet<String> = HashSet::new();
        for sub in self.subscriptions.clone() {
            let reference = self.reference();
            let frame = protocol::join_frame(&sub, self.cfg.access_token.as_deref(), reference)?;
            sink.send(Message::Text(frame.into()))
                .await
                .context("failed to send join")?;
            pending.insert(sub.topic());
        }

        let mut heartbeat = interval(self.cfg.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let mut joined: HashSet<String> = HashSet::new();
        let mut announced = false;

        let end = loop {
            tokio::select! {
                () = self.stop.cancelled() => break SessionEnd::Stopped,
                () = self.tx.closed() => break SessionEnd::Stopped,
                _ = heartbeat.tick() => {
                    let frame = protocol::heartbeat_frame(self.reference())?;
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        tracing::warn!(error = %e, "heartbeat failed");
                        break SessionEnd::Dropped { joined: !joined.is_empty() };
                    }
                }
                msg = source.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let inbound = match protocol::parse_frame(text.as_str()) {
                            Ok(inbound) => inbound,
                            Err(e) => {
                                tracing::debug!(error = %e, "ignoring malformed frame");
                                continue;
                            }
                        };
                        match inbound {
                            Inbound::Reply { topic, ok, reason } => {
                                if !pending.remove(&topic) {
                                    continue;
                                }
                                if ok {
                                    tracing::debug!(%topic, "channel joined");
                                    joined.insert(topic);
                                } else {
                                    tracing::warn!(%topic, reason = reason.as_deref().unwrap_or("unknown"), "channel join refused");
                                }
                                if !announced && pending.is_empty() && !joined.is_empty() {
                                    announced = true;
                                    let signal = if resync {
                                        FeedSignal::Reconnected
                                    } else {
                                        FeedSignal::Subscribed
                                    };
                                    if self.tx.send(signal).await.is_err() {
                                        break SessionEnd::Stopped;
                                    }
                                }
                            }
                            Inbound::Change(event) => {
                                if !joined.contains(&event.topic) {
                                    tracing::debug!(topic = %event.topic, "ignoring change before join ack");
                                    continue;
                                }
                                if self.tx.send(FeedSignal::Change(event)).await.is_err() {
                                    break SessionEnd::Stopped;
                                }
                            }
                            Inbound::ChannelClosed { topic } => {
                                if joined.remove(&topic) {
                                    tracing::warn!(%topic, "channel closed by server");
                                    break SessionEnd::Dropped { joined: true };
                                }
                            }
                            Inbound::Other { topic, event } => {
                                tracing::trace!(%topic, %event, "ignoring realtime event");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        sink.send(Message::Pong(payload)).await.ok();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "socket closed by server");
                        break SessionEnd::Dropped { joined: !joined.is_empty() };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket error");
                        break SessionEnd::Dropped { joined: !joined.is_empty() };
                    }
                    None => {
                        tracing::debug!("websocket stream ended");
                        break SessionEnd::Dropped { joined: !joined.is_empty() };
                    }
                }
            }
        };

        if matches!(end, SessionEnd::Stopped) {
            self.leave(&mut sink, &joined).await;
        }
        let _ = sink.close().await;
        Ok(end)
    }

    async fn leave(&mut self, sink: &mut WsSink, joined: &HashSet<String>) {
        for topic in joined {
            let reference = self.reference();
            let Ok(frame) = protocol::leave_frame(topic, reference) else {
                continue;
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
    }
}

/// URL with the query string (which carries the API key) removed, for logging.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

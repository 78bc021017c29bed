//! Keeps a local copy of remote state current, by polling or by following the change feed.
//!
//! Both strategies share one driver: every fetch cycle takes a [`Ticket`] from a
//! [`GenerationGate`] and its response is applied only if no later-issued cycle has been
//! applied already. Overlapping cycles therefore resolve newest-by-issuance.

pub mod feed;
pub mod gate;
pub mod lobby;
pub mod registry;
pub mod room;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, sleep_until};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::{Config, SyncMode};
use crate::error::AppError;
use crate::realtime::{Backoff, ChangeEvent, ChangeFeed, FeedSignal, RealtimeConfig};

pub use feed::{Feed, Reaction};
pub use gate::{GenerationGate, Ticket};
pub use lobby::LobbyFeed;
pub use registry::SyncRegistry;
pub use room::{RoomFeed, RoomState};

#[derive(Debug, Clone)]
pub enum SyncStrategy {
    /// Fetch immediately, then once per interval.
    Poll { interval: Duration },
    /// Fetch immediately, then follow the change feed. Resync once the channels are joined
    /// and after every reconnect; retry failed fetches with backoff.
    Push { realtime: RealtimeConfig },
}

impl SyncStrategy {
    /// Strategy selected by `SYNC_MODE`.
    ///
    /// # Errors
    ///
    /// Returns an error if push mode is selected and the websocket URL cannot be built.
    pub fn from_config(config: &Config, access_token: Option<String>) -> Result<Self, AppError> {
        match config.sync_mode {
            SyncMode::Poll => Ok(Self::Poll {
                interval: config.poll_interval,
            }),
            SyncMode::Push => Ok(Self::Push {
                realtime: RealtimeConfig::from_config(config, access_token)?,
            }),
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Poll { .. } => "poll",
            Self::Push { .. } => "push",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// No fetch cycle has completed yet.
    Loading,
    Live,
    /// The latest fetch cycle failed; the state shown is the last good one.
    Degraded(String),
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Live => write!(f, "live"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
        }
    }
}

/// What a synchronizer currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncView<S> {
    pub state: Option<S>,
    /// Ticket of the last applied fetch cycle or patched change; 0 before the first.
    pub generation: u64,
    pub status: SyncStatus,
}

impl<S> SyncView<S> {
    const fn loading() -> Self {
        Self {
            state: None,
            generation: 0,
            status: SyncStatus::Loading,
        }
    }
}

/// Owner's end of a running synchronizer. Dropping it stops the driver, aborts in-flight
/// fetches and closes the change feed.
pub struct SyncHandle<S> {
    view: watch::Receiver<SyncView<S>>,
    refresh: mpsc::Sender<()>,
    _stop: DropGuard,
}

impl<S: Clone> SyncHandle<S> {
    /// Request an immediate fetch cycle. Requests made while one is queued are coalesced.
    pub fn refresh(&self) {
        let _ = self.refresh.try_send(());
    }

    #[must_use]
    pub fn snapshot(&self) -> SyncView<S> {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncView<S>> {
        self.view.clone()
    }

    /// Wait for the next change after this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the synchronizer has stopped.
    pub async fn changed(&self) -> Result<SyncView<S>, AppError> {
        let mut rx = self.view.clone();
        rx.borrow_and_update();
        rx.changed()
            .await
            .map_err(|_| AppError::Internal("synchronizer stopped".to_string()))?;
        Ok(rx.borrow_and_update().clone())
    }

    /// Wait until the view satisfies `predicate` (checked against the current view first).
    ///
    /// # Errors
    ///
    /// Returns an error if the synchronizer stops first.
    pub async fn wait_for<P>(&self, mut predicate: P) -> Result<SyncView<S>, AppError>
    where
        P: FnMut(&SyncView<S>) -> bool,
    {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(|view| predicate(view))
            .await
            .map_err(|_| AppError::Internal("synchronizer stopped".to_string()))?;
        Ok(view.clone())
    }
}

pub struct Synchronizer;

impl Synchronizer {
    /// Spawn a synchronizer for `feed` on the current runtime.
    pub fn start<F: Feed>(feed: F, strategy: SyncStrategy) -> SyncHandle<F::State> {
        let (view_tx, view_rx) = watch::channel(SyncView::loading());
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        tracing::info!(feed = %feed.name(), strategy = strategy.label(), "starting synchronizer");
        let shared = Arc::new(Shared {
            feed,
            gate: GenerationGate::new(),
            view: view_tx,
        });
        tokio::spawn(drive(shared, strategy, refresh_rx, stop.clone()));

        SyncHandle {
            view: view_rx,
            refresh: refresh_tx,
            _stop: stop.drop_guard(),
        }
    }
}

struct Shared<F: Feed> {
    feed: F,
    gate: GenerationGate,
    view: watch::Sender<SyncView<F::State>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Applied,
    /// Superseded by a later cycle or patch, whether it succeeded or not.
    Stale,
    /// The latest cycle failed; the view is degraded.
    Failed,
}

impl<F: Feed> Shared<F> {
    async fn run_cycle(&self, ticket: Ticket) -> CycleOutcome {
        let generation = ticket.generation();
        match self.feed.fetch().await {
            Ok(fetched) => {
                let applied = self.view.send_if_modified(|view| {
                    if !self.gate.admit(ticket) {
                        return false;
                    }
                    view.state = Some(self.feed.merge(view.state.as_ref(), fetched));
                    view.generation = generation;
                    view.status = SyncStatus::Live;
                    true
                });
                if applied {
                    tracing::debug!(feed = %self.feed.name(), generation, "applied fetch");
                    CycleOutcome::Applied
                } else {
                    tracing::debug!(feed = %self.feed.name(), generation, "discarded stale fetch");
                    CycleOutcome::Stale
                }
            }
            Err(e) => {
                tracing::warn!(
                    feed = %self.feed.name(),
                    generation,
                    transient = e.is_transient(),
                    error = %e,
                    "fetch cycle failed"
                );
                let status = SyncStatus::Degraded(e.to_string());
                let mut current = false;
                self.view.send_if_modified(|view| {
                    current = self.gate.is_current(ticket);
                    if !current || view.status == status {
                        return false;
                    }
                    view.status = status;
                    true
                });
                if current {
                    CycleOutcome::Failed
                } else {
                    CycleOutcome::Stale
                }
            }
        }
    }

    /// Apply a change event to the held state.
    ///
    /// A patch takes a ticket of its own, so fetches issued before it can no longer be
    /// admitted over it.
    fn react(&self, change: &ChangeEvent) -> Reaction {
        let mut reaction = Reaction::Refetch;
        self.view.send_if_modified(|view| {
            let Some(state) = view.state.as_mut() else {
                return false;
            };
            reaction = self.feed.react(state, change);
            if reaction != Reaction::Updated {
                return false;
            }
            let ticket = self.gate.issue();
            self.gate.admit(ticket);
            view.generation = ticket.generation();
            true
        });
        reaction
    }
}

fn spawn_cycle<F: Feed>(cycles: &mut JoinSet<CycleOutcome>, shared: &Arc<Shared<F>>) {
    let ticket = shared.gate.issue();
    let shared = Arc::clone(shared);
    cycles.spawn(async move { shared.run_cycle(ticket).await });
}

async fn drive<F: Feed>(
    shared: Arc<Shared<F>>,
    strategy: SyncStrategy,
    mut refresh: mpsc::Receiver<()>,
    stop: CancellationToken,
) {
    let mut cycles = JoinSet::new();

    match strategy {
        SyncStrategy::Poll { interval } => {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => spawn_cycle(&mut cycles, &shared),
                    Some(()) = refresh.recv() => spawn_cycle(&mut cycles, &shared),
                    Some(_) = cycles.join_next(), if !cycles.is_empty() => {}
                }
            }
        }
        SyncStrategy::Push { realtime } => {
            let mut backoff = Backoff::new(realtime.backoff_initial, realtime.backoff_max);
            let mut retry_at: Option<Instant> = None;
            spawn_cycle(&mut cycles, &shared);
            let (_feed_task, mut signals) =
                ChangeFeed::spawn(realtime, shared.feed.subscriptions(), stop.child_token());
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    Some(()) = refresh.recv() => spawn_cycle(&mut cycles, &shared),
                    () = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                        retry_at = None;
                        spawn_cycle(&mut cycles, &shared);
                    }
                    signal = signals.recv() => match signal {
                        Some(FeedSignal::Change(change)) => match shared.react(&change) {
                            Reaction::Refetch => spawn_cycle(&mut cycles, &shared),
                            // Fetches in flight read the rows before this change.
                            Reaction::Updated if !cycles.is_empty() => {
                                spawn_cycle(&mut cycles, &shared);
                            }
                            Reaction::Updated | Reaction::Ignore => {}
                        },
                        Some(FeedSignal::Subscribed) => {
                            tracing::debug!(feed = %shared.feed.name(), "resyncing after subscribe");
                            spawn_cycle(&mut cycles, &shared);
                        }
                        Some(FeedSignal::Reconnected) => {
                            tracing::info!(feed = %shared.feed.name(), "resyncing after reconnect");
                            spawn_cycle(&mut cycles, &shared);
                        }
                        None => break,
                    },
                    Some(joined) = cycles.join_next(), if !cycles.is_empty() => match joined {
                        Ok(CycleOutcome::Applied) => {
                            backoff.reset();
                            retry_at = None;
                        }
                        Ok(CycleOutcome::Failed) if retry_at.is_none() => {
                            let delay = backoff.next_delay();
                            tracing::debug!(
                                feed = %shared.feed.name(),
                                delay_ms = delay.as_millis(),
                                attempt = backoff.attempt(),
                                "retrying fetch"
                            );
                            retry_at = Some(Instant::now() + delay);
                        }
                        _ => {}
                    },
                }
            }
        }
    }

    cycles.abort_all();
    tracing::debug!(feed = %shared.feed.name(), "synchronizer stopped");
}

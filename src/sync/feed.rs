use async_trait::async_trait;

use crate::error::AppError;
use crate::realtime::{ChangeEvent, Subscription};

/// What a change event did to the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// State was patched in place.
    Updated,
    /// The event cannot be applied locally; run a full fetch cycle.
    Refetch,
    Ignore,
}

/// A piece of remote state kept current by a synchronizer.
#[async_trait]
pub trait Feed: Send + Sync + 'static {
    type State: Clone + Send + Sync + 'static;

    /// Label used in logs.
    fn name(&self) -> String;

    /// One full fetch cycle.
    async fn fetch(&self) -> Result<Self::State, AppError>;

    /// Change-feed channels watched in push mode.
    fn subscriptions(&self) -> Vec<Subscription>;

    fn react(&self, state: &mut Self::State, change: &ChangeEvent) -> Reaction;

    /// Combine a fetched snapshot with the state it replaces.
    fn merge(&self, current: Option<&Self::State>, fetched: Self::State) -> Self::State {
        let _ = current;
        fetched
    }
}

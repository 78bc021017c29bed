use async_trait::async_trait;
use futures_util::future::try_join_all;

use super::{Feed, Reaction};
use crate::backend::{BackendClient, players, rooms};
use crate::dto::RoomSummary;
use crate::entities::tables;
use crate::error::AppError;
use crate::realtime::{ChangeEvent, Subscription};

/// Waiting rooms, newest first, each with its head count (counts fetched concurrently).
///
/// # Errors
///
/// Returns the first backend error.
pub async fn fetch_waiting_rooms(client: &BackendClient) -> Result<Vec<RoomSummary>, AppError> {
    let waiting = rooms::list_waiting(client).await?;
    let counts = try_join_all(
        waiting
            .iter()
            .map(|room| players::count_players(client, room.id)),
    )
    .await?;
    Ok(waiting
        .into_iter()
        .zip(counts)
        .map(|(room, current_players)| RoomSummary {
            room,
            current_players,
        })
        .collect())
}

/// The lobby's list of joinable rooms.
pub struct LobbyFeed {
    client: BackendClient,
}

impl LobbyFeed {
    #[must_use]
    pub const fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Feed for LobbyFeed {
    type State = Vec<RoomSummary>;

    fn name(&self) -> String {
        "lobby".to_string()
    }

    async fn fetch(&self) -> Result<Vec<RoomSummary>, AppError> {
        fetch_waiting_rooms(&self.client).await
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::all("lobby:rooms", tables::ROOMS),
            Subscription::all("lobby:players", tables::PLAYERS),
        ]
    }

    fn react(&self, _state: &mut Vec<RoomSummary>, change: &ChangeEvent) -> Reaction {
        match change.table.as_str() {
            tables::ROOMS | tables::PLAYERS => Reaction::Refetch,
            _ => Reaction::Ignore,
        }
    }
}

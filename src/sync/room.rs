use async_trait::async_trait;
use uuid::Uuid;

use super::{Feed, Reaction};
use crate::backend::{BackendClient, chat, players, rooms};
use crate::entities::{ChatMessage, Player, Room, tables};
use crate::error::AppError;
use crate::realtime::{ChangeEvent, ChangeKind, Subscription};

/// Everything the in-room view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    pub room: Room,
    /// Seating order: join order.
    pub players: Vec<Player>,
    /// Oldest first.
    pub messages: Vec<ChatMessage>,
}

impl RoomState {
    #[must_use]
    pub fn player(&self, user_id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    #[must_use]
    pub fn is_seated(&self, user_id: Uuid) -> bool {
        self.player(user_id).is_some()
    }
}

/// Room, roster and recent chat of one room.
pub struct RoomFeed {
    client: BackendClient,
    room_id: Uuid,
    history_limit: usize,
}

impl RoomFeed {
    #[must_use]
    pub const fn new(client: BackendClient, room_id: Uuid, history_limit: usize) -> Self {
        Self {
            client,
            room_id,
            history_limit,
        }
    }

    #[must_use]
    pub const fn room_id(&self) -> Uuid {
        self.room_id
    }
}

/// Insert `message` in creation order unless already present, keeping the newest `limit`.
fn append_message(messages: &mut Vec<ChatMessage>, message: ChatMessage, limit: usize) -> bool {
    if messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    let at = messages.partition_point(|m| m.created_at <= message.created_at);
    messages.insert(at, message);
    if messages.len() > limit {
        let excess = messages.len() - limit;
        messages.drain(..excess);
    }
    true
}

#[async_trait]
impl Feed for RoomFeed {
    type State = RoomState;

    fn name(&self) -> String {
        format!("room:{}", self.room_id)
    }

    async fn fetch(&self) -> Result<RoomState, AppError> {
        let (room, players, messages) = tokio::try_join!(
            rooms::get_room(&self.client, self.room_id),
            players::list_players(&self.client, self.room_id),
            chat::list_messages(&self.client, self.room_id, self.history_limit),
        )?;
        Ok(RoomState {
            room,
            players,
            messages,
        })
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        let id = self.room_id;
        vec![
            Subscription::all(format!("room:{id}:chat"), tables::CHAT_MESSAGES)
                .on(ChangeKind::Insert)
                .filter_eq("room_id", id),
            Subscription::all(format!("room:{id}:players"), tables::PLAYERS)
                .filter_eq("room_id", id),
            Subscription::all(format!("room:{id}:room"), tables::ROOMS).filter_eq("id", id),
        ]
    }

    fn react(&self, state: &mut RoomState, change: &ChangeEvent) -> Reaction {
        match change.table.as_str() {
            tables::CHAT_MESSAGES => {
                if change.kind != ChangeKind::Insert {
                    return Reaction::Ignore;
                }
                let Some(message) = change.record_as::<ChatMessage>() else {
                    return Reaction::Refetch;
                };
                if message.room_id != self.room_id {
                    return Reaction::Ignore;
                }
                if append_message(&mut state.messages, message, self.history_limit) {
                    Reaction::Updated
                } else {
                    Reaction::Ignore
                }
            }
            tables::ROOMS => match (change.kind, change.record_as::<Room>()) {
                (ChangeKind::Update, Some(room)) if room.id == self.room_id => {
                    state.room = room;
                    Reaction::Updated
                }
                _ => Reaction::Refetch,
            },
            tables::PLAYERS => Reaction::Refetch,
            _ => Reaction::Ignore,
        }
    }

    /// Keep messages appended from the change feed that the snapshot predates.
    fn merge(&self, current: Option<&RoomState>, fetched: RoomState) -> RoomState {
        let Some(current) = current else {
            return fetched;
        };
        let newest = fetched.messages.last().map(|m| m.created_at);
        let mut merged = fetched;
        for message in &current.messages {
            if newest.is_none_or(|t| message.created_at > t) {
                append_message(&mut merged.messages, message.clone(), self.history_limit);
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::entities::RoomStatus;

    fn feed(room_id: Uuid, limit: usize) -> RoomFeed {
        let config = Config::from_lookup(|key| match key {
            "SUPABASE_URL" => Some("http://127.0.0.1:9".to_string()),
            "SUPABASE_ANON_KEY" => Some("anon".to_string()),
            _ => None,
        });
        let Ok(client) = config.and_then(|c| BackendClient::new(&c)) else {
            unreachable!("client should build");
        };
        RoomFeed::new(client, room_id, limit)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_700_000_000 + secs)
    }

    fn room(id: Uuid) -> Room {
        Room {
            id,
            code: "ABC123".to_string(),
            name: "Test Room".to_string(),
            host_id: Uuid::new_v4(),
            status: RoomStatus::Waiting,
            max_players: 8,
            created_at: at(0),
            updated_at: None,
            game_start_at: None,
            game_end_at: None,
            phase: None,
            round_number: None,
        }
    }

    fn message(room_id: Uuid, secs: i64, text: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            room_id,
            user_id: Uuid::new_v4(),
            username: "vito".to_string(),
            message: text.to_string(),
            created_at: at(secs),
        }
    }

    fn state(room_id: Uuid, messages: Vec<ChatMessage>) -> RoomState {
        RoomState {
            room: room(room_id),
            players: Vec::new(),
            messages,
        }
    }

    fn insert_event(message: &ChatMessage) -> ChangeEvent {
        ChangeEvent {
            topic: "realtime:room:chat".to_string(),
            table: tables::CHAT_MESSAGES.to_string(),
            kind: ChangeKind::Insert,
            record: serde_json::to_value(message).ok(),
            old_record: None,
        }
    }

    fn texts(state: &RoomState) -> Vec<&str> {
        state.messages.iter().map(|m| m.message.as_str()).collect()
    }

    #[test]
    fn test_chat_insert_appends_in_creation_order() {
        let id = Uuid::new_v4();
        let feed = feed(id, 50);
        let mut s = state(id, vec![message(id, 1, "one"), message(id, 3, "three")]);

        let late = message(id, 2, "two");
        assert_eq!(feed.react(&mut s, &insert_event(&late)), Reaction::Updated);
        assert_eq!(texts(&s), vec!["one", "two", "three"]);

        assert_eq!(feed.react(&mut s, &insert_event(&late)), Reaction::Ignore);
        assert_eq!(s.messages.len(), 3);
    }

    #[test]
    fn test_chat_insert_for_other_room_is_ignored() {
        let id = Uuid::new_v4();
        let feed = feed(id, 50);
        let mut s = state(id, Vec::new());
        let stray = message(Uuid::new_v4(), 1, "elsewhere");
        assert_eq!(feed.react(&mut s, &insert_event(&stray)), Reaction::Ignore);
        assert!(s.messages.is_empty());
    }

    #[test]
    fn test_history_limit_keeps_newest() {
        let id = Uuid::new_v4();
        let feed = feed(id, 2);
        let mut s = state(id, vec![message(id, 1, "one"), message(id, 2, "two")]);
        let newest = message(id, 3, "three");
        assert_eq!(feed.react(&mut s, &insert_event(&newest)), Reaction::Updated);
        assert_eq!(texts(&s), vec!["two", "three"]);
    }

    #[test]
    fn test_player_change_refetches() {
        let id = Uuid::new_v4();
        let feed = feed(id, 50);
        let mut s = state(id, Vec::new());
        let change = ChangeEvent {
            topic: "realtime:room:players".to_string(),
            table: tables::PLAYERS.to_string(),
            kind: ChangeKind::Delete,
            record: None,
            old_record: Some(json!({ "id": Uuid::new_v4() })),
        };
        assert_eq!(feed.react(&mut s, &change), Reaction::Refetch);
    }

    #[test]
    fn test_room_update_patches_in_place() {
        let id = Uuid::new_v4();
        let feed = feed(id, 50);
        let mut s = state(id, Vec::new());
        let mut updated = room(id);
        updated.status = RoomStatus::Playing;
        let change = ChangeEvent {
            topic: "realtime:room:room".to_string(),
            table: tables::ROOMS.to_string(),
            kind: ChangeKind::Update,
            record: serde_json::to_value(&updated).ok(),
            old_record: None,
        };
        assert_eq!(feed.react(&mut s, &change), Reaction::Updated);
        assert_eq!(s.room.status, RoomStatus::Playing);
    }

    #[test]
    fn test_merge_keeps_messages_newer_than_snapshot() {
        let id = Uuid::new_v4();
        let feed = feed(id, 50);
        let first = message(id, 1, "one");
        let pushed = message(id, 5, "pushed");
        let current = state(id, vec![first.clone(), pushed]);
        let fetched = state(id, vec![first, message(id, 2, "two")]);

        let merged = feed.merge(Some(&current), fetched);
        assert_eq!(texts(&merged), vec!["one", "two", "pushed"]);
    }

    #[test]
    fn test_merge_without_current_takes_snapshot() {
        let id = Uuid::new_v4();
        let feed = feed(id, 50);
        let fetched = state(id, vec![message(id, 1, "one")]);
        assert_eq!(feed.merge(None, fetched.clone()), fetched);
    }

    #[test]
    fn test_subscriptions_are_scoped_to_room() {
        let id = Uuid::new_v4();
        let subs = feed(id, 50).subscriptions();
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].topic(), format!("realtime:room:{id}:chat"));
        assert_eq!(subs[0].event, "INSERT");
        assert_eq!(subs[2].filter, Some(format!("id=eq.{id}")));
    }
}

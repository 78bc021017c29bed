pub mod chat_message;
pub mod player;
pub mod profile;
pub mod room;
pub mod room_status;

pub use chat_message::ChatMessage;
pub use player::Player;
pub use profile::{Avatar, Gender, Profile};
pub use room::Room;
pub use room_status::{RoomPhase, RoomStatus};

/// Collection names on the backend.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const ROOMS: &str = "game_rooms";
    pub const PLAYERS: &str = "game_players";
    pub const CHAT_MESSAGES: &str = "chat_messages";
}

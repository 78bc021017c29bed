pub mod auth;
pub mod chat;
pub mod player;
pub mod profile;
pub mod room;

pub use auth::{Session, SignUpOutcome, User};
pub use chat::NewChatMessage;
pub use player::{NewPlayer, PlayerUpdate};
pub use profile::ProfileUpdate;
pub use room::{NewRoom, RoomStatusUpdate, RoomSummary, SetupStatus};

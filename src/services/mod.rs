pub mod auth_service;
pub mod chat_service;
pub mod player_service;
pub mod profile_service;
pub mod room_service;

pub use auth_service::AuthService;
pub use chat_service::ChatService;
pub use player_service::PlayerService;
pub use profile_service::{ProfileForm, ProfileService};
pub use room_service::RoomService;

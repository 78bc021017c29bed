pub mod format;
pub mod role_color;
pub mod room_code;
pub mod validation;

pub use format::{format_timestamp, truncate};
pub use role_color::{role_color, role_marker};
pub use room_code::{generate_room_code, is_valid_room_code, normalize_room_code};

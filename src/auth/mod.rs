//! Client-side authentication helpers: token claims, the OAuth redirect flow, and the
//! persisted session file.

pub mod jwt;
pub mod oauth;
pub mod session_store;

pub use jwt::{Claims, read_claims};
pub use oauth::PendingAuthorization;
pub use session_store::SessionStore;

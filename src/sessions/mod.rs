//! Signed session tokens and their lifecycle.

pub mod error;
pub mod manager;
pub mod state;
pub mod store;
pub mod token;

pub use error::SessionError;
pub use manager::{SessionManager, extract_token};
pub use state::SessionState;
pub use store::{MemoryStore, RedisStore, SessionStore};
pub use token::SessionToken;

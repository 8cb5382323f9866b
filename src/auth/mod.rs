//! Authentication layer
//!
//! Handles:
//! - Session cookie sealing
//! - Authentication middleware and extractors

pub mod cookie;
mod middleware;

pub use cookie::{open_session_id, seal_session_id};
pub use middleware::{
    AuthSession, CurrentAccount, MaybeAccount, require_auth, session_id_from_headers,
};

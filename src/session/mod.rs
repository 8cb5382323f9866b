//! Session layer
//!
//! The session store abstraction and the lifecycle manager that drives
//! the login / validate / refresh / logout state machine.

pub mod manager;
pub mod store;

pub use manager::{EstablishedSession, SessionManager, Validation};
pub use store::{MemorySessionStore, SessionEntry, SessionStore, Ttl};

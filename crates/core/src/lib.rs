//! Core types and traits for SQLite-backed web sessions.
//!
//! This crate provides:
//! - The [`Session`] record: identifier, attribute bag, and cookie options
//! - The [`SessionStore`] persistence abstraction
//! - Pure helpers for session IDs and expiry arithmetic

mod error;
mod functions;
mod traits;
mod types;

pub use error::SessionError;
pub use functions::{calculate_expiry, generate_session_id, is_session_expired};
pub use traits::{Result, SessionStore};
pub use types::{CookieOptions, LoadMode, SameSite, Session, SessionId};

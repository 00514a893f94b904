//! SQLite-backed web session storage with periodic expiry cleanup.
//!
//! This crate provides:
//! - [`SqliteSessionStore`]: session save/load/destroy over a
//!   [`sqlx::SqlitePool`], implementing the
//!   [`SessionStore`](sqlsession_core::SessionStore) trait
//! - A background cleanup task that deletes expired sessions on an interval
//!   ([`SqliteSessionStore::start_cleanup`] / [`stop_cleanup`]), with an
//!   optional pre-delete observer

mod cleanup;
mod store;

pub use cleanup::{stop_cleanup, DEFAULT_CLEANUP_INTERVAL};
pub use store::{PreDeleteCallback, SqliteSessionStore};

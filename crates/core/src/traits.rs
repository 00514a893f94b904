use async_trait::async_trait;

use crate::error::SessionError;
use crate::types::{LoadMode, Session, SessionId};

/// Result type for session-store operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session persistence abstraction.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a session, assigning a generated identifier on first save.
    async fn save(&self, session: &mut Session) -> Result<()>;

    /// Populate a session's attribute bag from its persisted row.
    async fn load(&self, session: &mut Session, mode: LoadMode) -> Result<()>;

    /// Delete a session row by identifier. Deleting an absent row is a no-op.
    async fn destroy(&self, id: &SessionId) -> Result<()>;
}

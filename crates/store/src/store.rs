//! SQLite session storage implementation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use sqlx::SqlitePool;

use sqlsession_core::{
    calculate_expiry, generate_session_id, is_session_expired, CookieOptions, LoadMode, Result,
    Session, SessionError, SessionId, SessionStore,
};

/// Observer invoked with each fully-loaded expired session just before the
/// cleanup task deletes its row.
pub type PreDeleteCallback = Arc<dyn Fn(Session) + Send + Sync>;

/// SQLite-backed session storage.
///
/// Cloning is cheap: the pool and the callback slot are shared between clones.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
    table: String,
    default_options: CookieOptions,
    pre_delete_callback: Arc<RwLock<Option<PreDeleteCallback>>>,
}

impl SqliteSessionStore {
    /// Creates a new SQLite session store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            table: "sessions".to_string(),
            default_options: CookieOptions::default(),
            pre_delete_callback: Arc::new(RwLock::new(None)),
        }
    }

    /// Use a custom table name instead of `sessions`.
    pub fn with_table_name(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Use custom default cookie options for sessions issued by this store.
    pub fn with_default_options(mut self, options: CookieOptions) -> Self {
        self.default_options = options;
        self
    }

    /// The cookie options copied onto every session this store creates.
    pub fn default_options(&self) -> &CookieOptions {
        &self.default_options
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn table(&self) -> &str {
        &self.table
    }

    /// Runs database migrations to create the session table and its expiry
    /// index.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                session_data TEXT NOT NULL,
                created_on TEXT NOT NULL,
                modified_on TEXT NOT NULL,
                expires_on TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_expires_on ON {table}(expires_on);
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Persist a session, assigning a generated identifier on first save.
    ///
    /// A non-positive max-age means the session is being discarded: the row is
    /// deleted instead of written.
    pub async fn save(&self, session: &mut Session) -> Result<()> {
        if session.options.max_age <= 0 {
            return self.destroy(&session.id).await;
        }

        if session.id.is_empty() {
            session.id = generate_session_id();
        }

        let data = serde_json::to_string(&session.values)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        let now = Utc::now();
        let expires_on = calculate_expiry(now, Duration::seconds(session.options.max_age));

        if session.is_new {
            sqlx::query(&format!(
                "INSERT INTO {} (id, session_data, created_on, modified_on, expires_on) VALUES (?, ?, ?, ?, ?)",
                self.table
            ))
            .bind(session.id.as_str())
            .bind(&data)
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(expires_on.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;

            session.is_new = false;
        } else {
            sqlx::query(&format!(
                "UPDATE {} SET session_data = ?, modified_on = ?, expires_on = ? WHERE id = ?",
                self.table
            ))
            .bind(&data)
            .bind(now.to_rfc3339())
            .bind(expires_on.to_rfc3339())
            .bind(session.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    /// Populate a session's attribute bag from its persisted row.
    ///
    /// [`LoadMode::RejectExpired`] is the public read path and returns
    /// [`SessionError::Expired`] for a past-expiry row. The cleanup task loads
    /// with [`LoadMode::IgnoreExpiry`] since it is about to delete the row
    /// anyway.
    pub async fn load(&self, session: &mut Session, mode: LoadMode) -> Result<()> {
        let row = sqlx::query_as::<_, (String, String)>(&format!(
            "SELECT session_data, expires_on FROM {} WHERE id = ?",
            self.table
        ))
        .bind(session.id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;

        let (data, expires_on) = row.ok_or(SessionError::NotFound)?;

        if mode == LoadMode::RejectExpired {
            let expires_on = DateTime::parse_from_rfc3339(&expires_on)
                .map_err(|e| SessionError::Storage(e.to_string()))?
                .with_timezone(&Utc);
            if is_session_expired(expires_on, Utc::now()) {
                return Err(SessionError::Expired);
            }
        }

        session.values =
            serde_json::from_str(&data).map_err(|e| SessionError::Serialization(e.to_string()))?;
        session.is_new = false;

        Ok(())
    }

    /// Delete a session row by identifier. Deleting an absent row is a no-op.
    pub async fn destroy(&self, id: &SessionId) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.table))
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Installs or replaces the observer invoked with each expired session
    /// just before the cleanup task deletes its row. Takes effect on the next
    /// sweep.
    ///
    /// Replacement is not synchronized with an in-flight sweep: a sweep that
    /// is already running may invoke either the old or the new observer.
    pub fn set_expired_session_pre_delete_callback<F>(&self, callback: F)
    where
        F: Fn(Session) + Send + Sync + 'static,
    {
        *self.pre_delete_callback.write() = Some(Arc::new(callback));
    }

    /// The observer registered for the current sweep cycle, if any.
    pub(crate) fn pre_delete_callback(&self) -> Option<PreDeleteCallback> {
        self.pre_delete_callback.read().clone()
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(&self, session: &mut Session) -> Result<()> {
        SqliteSessionStore::save(self, session).await
    }

    async fn load(&self, session: &mut Session, mode: LoadMode) -> Result<()> {
        SqliteSessionStore::load(self, session, mode).await
    }

    async fn destroy(&self, id: &SessionId) -> Result<()> {
        SqliteSessionStore::destroy(self, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Every `sqlite::memory:` connection is a distinct database, so the pool
    /// must be pinned to a single connection.
    async fn test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn test_store() -> SqliteSessionStore {
        let store = SqliteSessionStore::new(test_pool().await);
        store.migrate().await.unwrap();
        store
    }

    /// Backdate a saved row so it reads as expired.
    async fn expire_row(store: &SqliteSessionStore, id: &SessionId) {
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        sqlx::query(&format!(
            "UPDATE {} SET expires_on = ? WHERE id = ?",
            store.table()
        ))
        .bind(&past)
        .bind(id.as_str())
        .execute(store.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn save_assigns_id_and_load_roundtrips() {
        let store = test_store().await;

        let mut session = Session::new("my-app");
        session.insert("user_id", "user-123").unwrap();
        store.save(&mut session).await.unwrap();

        assert!(!session.id.is_empty());
        assert!(!session.is_new);

        let mut loaded = Session::new("my-app");
        loaded.id = session.id.clone();
        store.load(&mut loaded, LoadMode::RejectExpired).await.unwrap();

        assert_eq!(loaded.get::<String>("user_id").unwrap(), "user-123");
        assert!(!loaded.is_new);
    }

    #[tokio::test]
    async fn save_twice_updates_the_row() {
        let store = test_store().await;

        let mut session = Session::new("my-app");
        session.insert("count", 1).unwrap();
        store.save(&mut session).await.unwrap();

        session.insert("count", 2).unwrap();
        store.save(&mut session).await.unwrap();

        let mut loaded = Session::new("my-app");
        loaded.id = session.id.clone();
        store.load(&mut loaded, LoadMode::RejectExpired).await.unwrap();
        assert_eq!(loaded.get::<u32>("count").unwrap(), 2);
    }

    #[tokio::test]
    async fn load_nonexistent_returns_not_found() {
        let store = test_store().await;

        let mut session = Session::new("my-app");
        session.id = SessionId::new("missing".to_string());

        let err = store
            .load(&mut session, LoadMode::RejectExpired)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
    }

    #[tokio::test]
    async fn load_rejects_expired_row() {
        let store = test_store().await;

        let mut session = Session::new("my-app");
        store.save(&mut session).await.unwrap();
        expire_row(&store, &session.id).await;

        let mut loaded = Session::new("my-app");
        loaded.id = session.id.clone();
        let err = store
            .load(&mut loaded, LoadMode::RejectExpired)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Expired));
    }

    #[tokio::test]
    async fn ignore_expiry_loads_expired_row() {
        let store = test_store().await;

        let mut session = Session::new("my-app");
        session.insert("user_id", "user-123").unwrap();
        store.save(&mut session).await.unwrap();
        expire_row(&store, &session.id).await;

        let mut loaded = Session::new("my-app");
        loaded.id = session.id.clone();
        store.load(&mut loaded, LoadMode::IgnoreExpiry).await.unwrap();
        assert_eq!(loaded.get::<String>("user_id").unwrap(), "user-123");
    }

    #[tokio::test]
    async fn destroy_removes_the_row() {
        let store = test_store().await;

        let mut session = Session::new("my-app");
        store.save(&mut session).await.unwrap();
        store.destroy(&session.id).await.unwrap();

        let mut loaded = Session::new("my-app");
        loaded.id = session.id.clone();
        let err = store
            .load(&mut loaded, LoadMode::RejectExpired)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
    }

    #[tokio::test]
    async fn destroy_nonexistent_is_a_no_op() {
        let store = test_store().await;
        let result = store.destroy(&SessionId::new("missing".to_string())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn non_positive_max_age_destroys_the_session() {
        let store = test_store().await;

        let mut session = Session::new("my-app");
        store.save(&mut session).await.unwrap();
        let id = session.id.clone();

        session.options.max_age = -1;
        store.save(&mut session).await.unwrap();

        let mut loaded = Session::new("my-app");
        loaded.id = id;
        let err = store
            .load(&mut loaded, LoadMode::RejectExpired)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
    }

    #[tokio::test]
    async fn custom_table_name_is_used() {
        let store = SqliteSessionStore::new(test_pool().await).with_table_name("my_sessions");
        store.migrate().await.unwrap();

        let mut session = Session::new("my-app");
        store.save(&mut session).await.unwrap();

        let row = sqlx::query("SELECT id FROM my_sessions")
            .fetch_one(store.pool())
            .await;
        assert!(row.is_ok());
    }

    #[tokio::test]
    async fn store_is_usable_behind_the_trait() {
        let store = test_store().await;
        let store: &dyn SessionStore = &store;

        let mut session = Session::new("my-app");
        store.save(&mut session).await.unwrap();
        store.destroy(&session.id).await.unwrap();
    }
}

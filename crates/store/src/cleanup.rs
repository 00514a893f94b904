//! Periodic deletion of expired sessions.
//!
//! [`SqliteSessionStore::start_cleanup`] spawns a background task that sweeps
//! the session table at a fixed interval. A sweep selects every row whose
//! expiry timestamp has passed (evaluated by SQLite, so the store and the
//! database never disagree on "now"), hands each loaded session to the
//! optional pre-delete observer, then deletes the rows by identifier.
//! [`stop_cleanup`] performs the quit/done handshake and returns once the
//! task has acknowledged.

use std::time::Duration;

use sqlx::Row;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use sqlsession_core::{LoadMode, Result, Session, SessionError, SessionId};

use crate::store::SqliteSessionStore;

/// Sweep interval used when [`SqliteSessionStore::start_cleanup`] is given a
/// zero interval.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

impl SqliteSessionStore {
    /// Spawns the background cleanup task.
    ///
    /// `session_name` is forwarded into every session handed to the
    /// pre-delete observer. A zero `interval` falls back to
    /// [`DEFAULT_CLEANUP_INTERVAL`]. The first sweep runs only after a full
    /// interval has elapsed.
    ///
    /// Returns the quit/done handles to pass to [`stop_cleanup`].
    pub fn start_cleanup(
        &self,
        session_name: impl Into<String>,
        interval: Duration,
    ) -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
        let interval = if interval.is_zero() {
            DEFAULT_CLEANUP_INTERVAL
        } else {
            interval
        };

        let (quit_tx, quit_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(cleanup_loop(
            self.clone(),
            session_name.into(),
            interval,
            quit_rx,
            done_tx,
        ));

        (quit_tx, done_rx)
    }

    /// Runs one select-notify-delete cycle for expired sessions.
    ///
    /// The first select or delete error aborts the cycle; rows left undeleted
    /// by an aborted cycle are still expired and are picked up again on the
    /// next sweep. Individual load failures never abort the cycle.
    pub async fn sweep_expired(&self, session_name: &str) -> Result<()> {
        let expired = self.collect_expired_and_notify(session_name).await?;

        for id in &expired {
            self.destroy(id).await?;
        }

        Ok(())
    }

    /// Selects the identifiers of all expired rows, loading each session and
    /// invoking the pre-delete observer along the way.
    ///
    /// Malformed rows are logged and skipped. A session whose body fails to
    /// load is logged and gets no observer invocation, but its identifier
    /// stays in the returned list so the stale row is still cleaned up.
    async fn collect_expired_and_notify(&self, session_name: &str) -> Result<Vec<SessionId>> {
        let rows = match sqlx::query(&format!(
            "SELECT id FROM {} WHERE datetime(expires_on) < datetime('now')",
            self.table()
        ))
        .fetch_all(self.pool())
        .await
        {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "failed to query expired sessions");
                return Err(SessionError::Storage(err.to_string()));
            }
        };

        let callback = self.pre_delete_callback();

        let mut expired = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = match row.try_get("id") {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping malformed expired-session row");
                    continue;
                }
            };
            let id = SessionId::new(id);
            expired.push(id.clone());

            let mut session = Session::new(session_name);
            session.id = id;
            session.options = self.default_options().clone();
            if let Err(err) = self.load(&mut session, LoadMode::IgnoreExpiry).await {
                tracing::warn!(
                    session_id = %session.id,
                    error = %err,
                    "failed to load expired session"
                );
                continue;
            }

            if let Some(callback) = &callback {
                callback(session);
            }
        }

        Ok(expired)
    }
}

/// Background task body: sweep on every tick, stop on quit.
async fn cleanup_loop(
    store: SqliteSessionStore,
    session_name: String,
    period: Duration,
    mut quit: oneshot::Receiver<()>,
    done: oneshot::Sender<()>,
) {
    // No sweep before the first full interval has elapsed. Ticks missed while
    // a sweep is running are dropped, not replayed.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Quit wins over a pending tick. A dropped quit sender stops the
            // loop as well.
            biased;
            _ = &mut quit => {
                let _ = done.send(());
                return;
            }
            _ = ticker.tick() => {
                if let Err(err) = store.sweep_expired(&session_name).await {
                    tracing::error!(error = %err, "failed to delete expired sessions");
                }
            }
        }
    }
}

/// Stops the background cleanup task started by
/// [`SqliteSessionStore::start_cleanup`] and waits for its acknowledgment.
///
/// After this returns, no further sweep will execute. The handles are
/// consumed, so a stop can be paired with exactly one start.
pub async fn stop_cleanup(quit: oneshot::Sender<()>, done: oneshot::Receiver<()>) {
    let _ = quit.send(());
    let _ = done.await;
}

//! Periodic session cleanup example.
//!
//! Seeds an in-memory store with one expired and one live session, runs the
//! cleanup task on a short interval, and stops it via the quit/done
//! handshake.
//!
//! # Running
//! ```bash
//! cargo run --example cleanup -p sqlsession_store
//! ```

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlsession_core::Session;
use sqlsession_store::{stop_cleanup, SqliteSessionStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlsession_store=debug,cleanup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // An in-memory database only exists on its own connection, so pin the
    // pool to one.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    let store = SqliteSessionStore::new(pool.clone());
    store.migrate().await?;

    let mut stale = Session::new("example-session");
    stale.insert("user_id", "user-123")?;
    store.save(&mut stale).await?;

    let mut fresh = Session::new("example-session");
    fresh.insert("user_id", "user-456")?;
    store.save(&mut fresh).await?;

    // Backdate the first session so the sweep picks it up.
    sqlx::query("UPDATE sessions SET expires_on = ? WHERE id = ?")
        .bind((chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339())
        .bind(stale.id.as_str())
        .execute(&pool)
        .await?;

    store.set_expired_session_pre_delete_callback(|session| {
        tracing::info!(
            session_id = %session.id,
            user_id = ?session.get::<String>("user_id"),
            "deleting expired session"
        );
    });

    let (quit, done) = store.start_cleanup("example-session", Duration::from_millis(200));
    tracing::info!("cleanup task started");

    tokio::time::sleep(Duration::from_millis(500)).await;

    stop_cleanup(quit, done).await;
    tracing::info!("cleanup task stopped");

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(&pool)
        .await?;
    tracing::info!(remaining, "sessions left in the store");

    Ok(())
}

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::config::AppConfig;

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")
}

pub async fn run_migrations(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    Ok(())
}

/// True when the root cause is a Postgres unique-constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}

/// Single readiness probe: open a connection and run `SELECT 1`.
pub async fn ping(database_url: &str) -> anyhow::Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await
        .context("connect")?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("select 1")?;
    pool.close().await;
    Ok(())
}

/// Blocks until the database answers, retrying forever at a fixed interval.
/// Returns the number of attempts it took.
pub async fn wait_for_db(database_url: &str, interval: Duration) -> u32 {
    wait_until_ready(|| ping(database_url), interval).await
}

pub async fn wait_until_ready<F, Fut>(mut probe: F, interval: Duration) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    info!("waiting for database...");
    let mut attempts = 0;
    loop {
        attempts += 1;
        match probe().await {
            Ok(()) => {
                info!(attempts, "database available");
                return attempts;
            }
            Err(e) => {
                warn!(error = %e, attempts, "database unavailable, waiting {:?}", interval);
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ready_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let attempts = wait_until_ready(
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let attempts = wait_until_ready(
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 5 {
                        anyhow::bail!("connection refused");
                    }
                    Ok(())
                }
            },
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(attempts, 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }
}

//! Helpers for tests that need a real Postgres. Point `TEST_DATABASE_URL` at a
//! scratch database; tests return early when it is unreachable.

use std::sync::Arc;

use axum::Router;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    auth::JwtKeys,
    state::AppState,
    storage::{LocalStorage, StorageClient},
    users::repo::{NewUser, User},
};

pub async fn pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = match PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(3))
        .connect(&url)
        .await
    {
        Ok(db) => db,
        Err(e) => {
            println!("test database not available ({e}), skipping");
            return None;
        }
    };
    expect_migrated(crate::db::run_migrations(&db).await);
    Some(db)
}

/// A reachable database whose schema cannot be migrated fails the test
/// instead of skipping it.
fn expect_migrated(result: anyhow::Result<()>) {
    if let Err(e) = result {
        panic!("migrating test database failed: {e:?}");
    }
}

pub fn unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4().simple())
}

/// A full app over the test database, with images written to a temp dir.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub media: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Option<Self> {
        let db = pool().await?;
        let media = tempfile::tempdir().ok()?;
        let config = AppState::test_config("postgres://unused", media.path().to_path_buf());
        let storage = Arc::new(LocalStorage::new(media.path().to_path_buf(), "/media".into()))
            as Arc<dyn StorageClient>;
        let state = AppState::from_parts(db, Arc::new(config), storage);
        let router = crate::app::build_app(state.clone());
        Some(Self {
            state,
            router,
            media,
        })
    }

    pub async fn create_user(&self) -> User {
        User::create(
            &self.state.db,
            NewUser::regular(&unique_email(), "password123").unwrap(),
        )
        .await
        .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        let keys = JwtKeys::from(&self.state.config.jwt);
        keys.sign(user.id).unwrap()
    }
}

mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "migrating test database failed")]
    fn migration_failure_is_not_a_skip() {
        expect_migrated(Err(anyhow::anyhow!("relation \"users\" already exists")));
    }

    #[test]
    fn successful_migration_passes() {
        expect_migrated(Ok(()));
    }
}

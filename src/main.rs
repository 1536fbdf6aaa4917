use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod app;
mod attrs;
mod auth;
mod config;
mod db;
mod error;
mod recipes;
mod state;
mod storage;
mod users;
mod validation;

#[cfg(test)]
mod testing;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::users::{
    dto::UserRequest,
    repo::{NewUser, User},
};

#[derive(Debug, Parser)]
#[command(name = "recipe-api", version, about = "Recipe API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply migrations and serve HTTP (default).
    Serve,
    /// Block until the database accepts connections.
    WaitForDb {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
        #[arg(long, env = "DB_WAIT_INTERVAL_SECS", default_value_t = 1)]
        interval_secs: u64,
    },
    /// Apply pending migrations and exit.
    Migrate,
    /// Create a staff superuser.
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipe_api=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Applies the same email and password rules as `POST /user/create/`.
fn superuser_from_args(email: String, password: String, name: String) -> anyhow::Result<NewUser> {
    let reg = UserRequest {
        email: Some(email),
        password: Some(password),
        name: Some(name).filter(|n| !n.is_empty()),
    }
    .into_admin_registration()?;
    Ok(NewUser::superuser(&reg.email, &reg.password)?.with_name(reg.name))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = AppConfig::from_env()?;
            let app_state = AppState::init(config).await?;
            db::run_migrations(&app_state.db).await?;
            app::serve(app::build_app(app_state)).await
        }
        Command::WaitForDb {
            database_url,
            interval_secs,
        } => {
            db::wait_for_db(&database_url, Duration::from_secs(interval_secs)).await;
            Ok(())
        }
        Command::Migrate => {
            let config = AppConfig::from_env()?;
            let pool = db::connect(&config).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("migrations applied");
            Ok(())
        }
        Command::CreateSuperuser {
            email,
            password,
            name,
            database_url,
        } => {
            let new = superuser_from_args(email, password, name)?;
            let pool = PgPoolOptions::new()
                .max_connections(1)
                .connect(&database_url)
                .await?;
            tracing::debug!(
                email = %new.email(),
                is_staff = new.is_staff(),
                is_superuser = new.is_superuser(),
                "creating superuser"
            );
            if User::email_taken(&pool, new.email(), None).await? {
                anyhow::bail!("a user with email {} already exists", new.email());
            }
            let user = User::create(&pool, new).await?;
            tracing::info!(user_id = %user.id, email = %user.email, "superuser created");
            Ok(())
        }
    }
}

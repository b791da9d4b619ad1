use clap::{Parser, Subcommand};

mod app;
mod auth;
mod config;
mod db;
mod error;
mod pages;
mod qrcodes;
mod state;
mod storage;

use crate::config::{AppConfig, Environment};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "qrforge", version, about = "QR code generator with per-user history")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply migrations and start the HTTP server (default).
    Serve,
    /// Drop and recreate the schema. Development only.
    ResetDb,
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "qrforge=debug,axum=info,tower_http=info".to_string());
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let pool = db::connect(&config.database_url).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            db::migrate(&pool).await?;
            let state = AppState::init(config, pool)?;
            app::serve(app::build_app(state)).await
        }
        Command::ResetDb => {
            if config.environment != Environment::Development {
                anyhow::bail!("reset-db refused: ENVIRONMENT is not development");
            }
            db::reset_schema(&pool).await?;
            tracing::warn!("database schema dropped and recreated");
            Ok(())
        }
    }
}

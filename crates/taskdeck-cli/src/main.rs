use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use taskdeck_core::{Clock, SystemClock, TaskdeckConfig};
use taskdeck_scheduler::TaskStore;
use tracing::info;

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskdeck=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // load config: --config > TASKDECK_CONFIG env > ~/.taskdeck/taskdeck.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("TASKDECK_CONFIG").ok());
    let config = TaskdeckConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        TaskdeckConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    let store = Arc::new(TaskStore::new(db)?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.alerts.offset()));

    match cli.command {
        Command::Add(args) => commands::add(&store, args),
        Command::List { json } => commands::list(&store, json),
        Command::Occurrences { id, days, json } => {
            commands::occurrences(&store, clock.as_ref(), &id, days, json)
        }
        Command::Next { limit, json } => commands::next(&store, clock.as_ref(), limit, json),
        Command::Remove { id } => commands::remove(&store, &id),
        Command::Watch { reload_secs } => {
            commands::watch(
                store,
                clock,
                config.alerts.tick_period(),
                Duration::from_secs(reload_secs),
            )
            .await
        }
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

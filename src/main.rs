//! Book Relay service
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────────┐
//! │  Config  │───▶│  Store   │───▶│ Due-Soon Scanner │──▶ handover threads
//! │  (YAML)  │    │(PG / RAM)│    │   (every N secs) │
//! └──────────┘    └──────────┘    └──────────────────┘
//! ```
//!
//! Runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use book_relay::circulation::{CirculationStore, MemoryStore, Notifier, PgStore, TracingNotifier};
use book_relay::config::AppConfig;
use book_relay::db::Database;
use book_relay::{Library, logging};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CirculationStore>> {
    let Some(url) = &config.postgres_url else {
        warn!("postgres_url not configured, using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let db = Database::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("PostgreSQL health check failed")?;

    let store = PgStore::new(db.pool().clone());
    store.migrate().await.context("Failed to initialize schema")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = logging::init_logging(&app_config);

    info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        policy = ?app_config.circulation.request_policy,
        "Starting book relay"
    );

    let store = open_store(&app_config).await?;
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let library = Library::new(store, notifier, &app_config.circulation);

    let scanner = async {
        library.scanner.run().await;
    };

    tokio::select! {
        _ = scanner => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

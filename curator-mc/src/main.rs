//! curator-mc - Metadata Curation service
//!
//! **Module Identity:**
//! - Name: curator-mc (Metadata Curation)
//! - Port: 5731
//!
//! Automates metadata enrichment of a self-hosted media catalog:
//! provider scraping runs, status detection, run history, duplicate
//! detection and merging. Integrates with web clients via HTTP REST +
//! SSE.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use curator_common::config::{
    default_config_path, ensure_data_dir, load_toml_config, resolve_data_dir, TomlConfig,
};
use curator_common::events::EventBus;

use curator_mc::automation::AutomationOrchestrator;
use curator_mc::client::HostClient;
use curator_mc::detect::{StatusDetector, StatusTracker};
use curator_mc::duplicates::DuplicateEngine;
use curator_mc::history::HistoryStore;
use curator_mc::ui_adapter::NullUiAdapter;
use curator_mc::AppState;

#[derive(Debug, Parser)]
#[command(name = "curator-mc", version, about = "Metadata Curation service")]
struct Args {
    /// Data directory (overrides CURATOR_DATA_DIR and TOML config)
    #[arg(long)]
    data_dir: Option<String>,

    /// Listen port
    #[arg(long, default_value_t = 5731)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting curator-mc (Metadata Curation) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve data directory: CLI > ENV > TOML > OS default
    let data_dir = resolve_data_dir(args.data_dir.as_deref(), "CURATOR_DATA_DIR");
    let db_path = ensure_data_dir(&data_dir)?;
    info!("Database: {}", db_path.display());

    let db = curator_mc::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    // TOML is the bootstrap tier for endpoint and key
    let toml_config = load_toml_config(&default_config_path()).unwrap_or_else(|_| {
        info!("No TOML config found, relying on database and environment");
        TomlConfig::default()
    });
    let endpoint = curator_mc::config::resolve_host_endpoint(&db, &toml_config).await?;
    let api_key = curator_mc::config::resolve_host_api_key(&db, &toml_config).await?;
    let endpoint = match endpoint {
        Some(endpoint) => endpoint,
        None => {
            warn!(
                "Host endpoint not configured; set it via PUT /api/settings, \
                 CURATOR_HOST_ENDPOINT, or {}",
                default_config_path().display()
            );
            "http://localhost:9999/graphql".to_string()
        }
    };

    let client = HostClient::new(endpoint, api_key, event_bus.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build host client: {}", e))?;
    client.spawn_invalidation_listener();

    // Headless deployment: no UI bridge attached
    let ui = Arc::new(NullUiAdapter);
    let detector = Arc::new(StatusDetector::new(client.clone(), ui.clone()));
    let providers = curator_mc::db::settings::providers(&db).await;
    let tracker = Arc::new(StatusTracker::new(
        client.clone(),
        detector,
        event_bus.clone(),
        providers,
    ));

    let history = Arc::new(HistoryStore::load(db.clone()).await?);
    info!("Loaded {} history entries", history.len());

    let orchestrator = Arc::new(AutomationOrchestrator::new(
        client.clone(),
        ui,
        tracker.clone(),
        history.clone(),
        event_bus.clone(),
        db.clone(),
    ));
    let duplicates = Arc::new(DuplicateEngine::new(
        client.clone(),
        db.clone(),
        event_bus.clone(),
    ));

    let state = AppState::new(db, event_bus, client, tracker, history, orchestrator, duplicates);
    let app = curator_mc::build_router(state);

    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

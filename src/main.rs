//! LEAGUES: asset prediction rosters and contest submissions
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the session from disk (or starts fresh), serves the JSON
//! API and keeps the asset catalog fresh until shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use leagues::api::{self, ApiContext};
use leagues::catalog::coingecko::CoinGeckoClient;
use leagues::catalog::contests::FileContestCatalog;
use leagues::catalog::stocks::StockQuoteClient;
use leagues::catalog::{self, AssetSource, ContestCatalog, SnapshotCatalog};
use leagues::config::{AppConfig, StorageBackend};
use leagues::engine::submission::{SubmissionController, SubmissionPolicy};
use leagues::storage::sqlite::SqliteGateway;
use leagues::storage::supabase::SupabaseGateway;
use leagues::storage::{self, PersistenceGateway};

const BANNER: &str = r#"
 _     _____    _    ____ _   _ _____ ____
| |   | ____|  / \  / ___| | | | ____/ ___|
| |   |  _|   / _ \| |  _| | | |  _| \___ \
| |___| |___ / ___ \ |_| | |_| | |___ ___) |
|_____|_____/_/   \_\____|\___/|_____|____/

  Pick five. Call the move. Submit.
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        backend = ?cfg.storage.backend,
        refresh_interval_secs = cfg.catalog.refresh_interval_secs,
        require_full_roster = cfg.session.require_full_roster,
        "LEAGUES starting up"
    );

    // -- Persistence -----------------------------------------------------

    let gateway = build_gateway(&cfg).await?;

    // -- Restore or create session ---------------------------------------

    let owner = cfg.session.owner_identity();
    let policy = SubmissionPolicy {
        require_full_roster: cfg.session.require_full_roster,
        timeout: cfg.session.submit_timeout(),
    };
    let state_file = cfg.session.state_file.as_str();

    let controller = match storage::load_session(Some(state_file))? {
        Some(snapshot) => {
            info!(
                selections = snapshot.selections.len(),
                submitted = snapshot.is_submitted,
                "Resumed saved session"
            );
            SubmissionController::restore(gateway.clone(), owner, policy, snapshot)
        }
        None => {
            info!(owner = %owner, "Fresh session");
            SubmissionController::new(gateway.clone(), owner, policy)
        }
    };
    let controller = Arc::new(controller);

    // -- Catalogs --------------------------------------------------------

    let sources = build_sources(&cfg)?;
    let assets = Arc::new(SnapshotCatalog::new());
    let contests = Arc::new(FileContestCatalog::load(&cfg.contests.file)?);

    let report = catalog::refresh(&assets, &sources).await;
    info!(
        assets = report.total_assets,
        failed = report.failed.len(),
        contests = contests.current_contests().len(),
        "Initial catalog loaded"
    );

    // -- API -------------------------------------------------------------

    if cfg.api.enabled {
        let ctx = Arc::new(ApiContext {
            assets: assets.clone(),
            contests: contests.clone(),
            controller: controller.clone(),
            gateway: gateway.clone(),
        });
        api::spawn_api(ctx, cfg.api.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let refresh_every = Duration::from_secs(cfg.catalog.refresh_interval_secs.max(1));
    let mut interval = tokio::time::interval(refresh_every);
    interval.tick().await;

    let mut updates = controller.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = refresh_every.as_secs(),
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = catalog::refresh(&assets, &sources).await;
                if !report.failed.is_empty() {
                    warn!(failed = ?report.failed, "Some asset sources failed this round");
                }
                if let Err(e) = contests.reload() {
                    warn!(error = %e, "Contest reload failed, keeping previous list");
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Err(e) = storage::save_session(&snapshot, Some(state_file)) {
                    error!(error = %e, "Failed to save session");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let snapshot = controller.snapshot();
    storage::save_session(&snapshot, Some(state_file))?;
    info!(
        phase = %snapshot.phase,
        selections = snapshot.selections.len(),
        submitted = snapshot.is_submitted,
        "LEAGUES shut down cleanly."
    );

    Ok(())
}

/// Connect the configured persistence backend.
async fn build_gateway(cfg: &AppConfig) -> Result<Arc<dyn PersistenceGateway>> {
    match cfg.storage.backend {
        StorageBackend::Sqlite => {
            let gw = SqliteGateway::connect(&cfg.storage.database_url).await?;
            info!(url = %cfg.storage.database_url, "Using SQLite storage");
            Ok(Arc::new(gw))
        }
        StorageBackend::Supabase => {
            let url_env = cfg
                .storage
                .supabase_url_env
                .as_deref()
                .context("storage.supabase_url_env is required for the supabase backend")?;
            let key_env = cfg
                .storage
                .supabase_key_env
                .as_deref()
                .context("storage.supabase_key_env is required for the supabase backend")?;
            let url = AppConfig::resolve_env(url_env)?;
            let key = AppConfig::resolve_secret(key_env)?;
            info!(url = %url, "Using Supabase storage");
            Ok(Arc::new(SupabaseGateway::new(&url, key)?))
        }
    }
}

/// Build the enabled asset feeds.
fn build_sources(cfg: &AppConfig) -> Result<Vec<Box<dyn AssetSource>>> {
    let mut sources: Vec<Box<dyn AssetSource>> = Vec::new();

    if cfg.catalog.coingecko.enabled {
        sources.push(Box::new(CoinGeckoClient::new(cfg.catalog.coingecko.limit)?));
    }

    if cfg.catalog.stocks.enabled {
        match AppConfig::resolve_secret(&cfg.catalog.stocks.api_key_env) {
            Ok(key) => sources.push(Box::new(StockQuoteClient::new(
                key,
                cfg.catalog.stocks.symbols.clone(),
            )?)),
            Err(e) => warn!(error = %e, "Stock feed enabled but no API key, skipping"),
        }
    }

    if sources.is_empty() {
        warn!("No asset sources enabled, the catalog will stay empty");
    }
    Ok(sources)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("leagues=info"));

    let json_logging = std::env::var("LEAGUES_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

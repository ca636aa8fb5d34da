//! PICKSLIP: bet slip engine for AI-generated sports picks
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the remote backend and local cache, starts the slip session and access
//! refresh, serves the HTTP API, and flushes the slip on shutdown.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

use pickslip::access::{AccessControl, AccessPolicy};
use pickslip::api::{self, ApiState};
use pickslip::config::{self, RemoteBackend};
use pickslip::odds::format::Locale;
use pickslip::remote::rest::RestBackend;
use pickslip::remote::sqlite::SqliteBackend;
use pickslip::remote::{SlipRemote, TierSource};
use pickslip::slip::SlipStore;
use pickslip::storage::JsonFileCache;

const BANNER: &str = r#"
 ____  _      _    ____  _ _
|  _ \(_) ___| | _/ ___|| (_)_ __
| |_) | |/ __| |/ /\___ \| | | '_ \
|  __/| | (__|   <  ___) | | | |_) |
|_|   |_|\___|_|\_\|____/|_|_| .__/
                             |_|
  Bet slip engine · v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    let locale = std::env::var("PICKSLIP_LOCALE")
        .ok()
        .and_then(|raw| raw.parse::<Locale>().ok())
        .unwrap_or(cfg.app.locale);
    info!(
        name = %cfg.app.name,
        locale = %locale,
        debounce_ms = cfg.slip.debounce_ms,
        "PICKSLIP starting up"
    );

    // -- Backends --------------------------------------------------------

    let (remote, tiers) = connect_backend(&cfg.remote).await?;
    info!(backend = remote.name(), "Remote backend ready");

    let cache = Arc::new(JsonFileCache::new(&cfg.slip.cache_path, cfg.slip.cache_key.clone()));

    let admin_email = cfg.admin_email();
    if admin_email.is_none() {
        warn!("No admin email configured; admin override disabled");
    }
    let access = Arc::new(AccessControl::new(tiers, AccessPolicy { admin_email }));
    let slip = Arc::new(SlipStore::with_debounce(remote, cache, cfg.slip.debounce()));

    // -- Session ---------------------------------------------------------

    let identity = cfg.session_identity();
    match &identity {
        Some(id) => info!(identity = %id, "Signed in"),
        None => info!("No session identity configured; running signed out"),
    }

    let (_, snapshot) = futures::join!(
        slip.start_session(identity.clone()),
        access.refresh(identity.as_ref()),
    );
    info!(
        tier = %snapshot.tier,
        is_admin = snapshot.is_admin,
        legs = slip.len(),
        "Session initialised"
    );

    // -- API -------------------------------------------------------------

    let server = if cfg.api.enabled {
        let state = Arc::new(ApiState {
            slip: slip.clone(),
            access: access.clone(),
            default_stake: cfg.slip.default_stake,
            locale,
        });
        Some(api::spawn_api(state, cfg.api.port).await?)
    } else {
        None
    };

    info!("Ready. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received.");

    if let Some(server) = server {
        server.abort();
    }

    // Skip the debounce so the last mutations reach the remote store
    slip.flush_now().await;
    slip.end_session();
    access.sign_out();

    info!("PICKSLIP shut down cleanly.");
    Ok(())
}

/// Build the configured remote backend. One connection serves both the slip
/// store and the subscription lookup.
async fn connect_backend(
    remote: &config::RemoteConfig,
) -> Result<(Arc<dyn SlipRemote>, Arc<dyn TierSource>)> {
    match remote.backend {
        RemoteBackend::Sqlite => {
            let url = remote
                .database_url
                .as_deref()
                .context("remote.database_url is not set")?;
            let backend = Arc::new(SqliteBackend::connect(url).await?);
            let slips: Arc<dyn SlipRemote> = backend.clone();
            let tiers: Arc<dyn TierSource> = backend;
            Ok((slips, tiers))
        }
        RemoteBackend::Rest => {
            let base_url = remote.base_url.as_deref().context("remote.base_url is not set")?;
            let key_env = remote
                .api_key_env
                .as_deref()
                .context("remote.api_key_env is not set")?;
            let api_key = SecretString::new(config::AppConfig::resolve_env(key_env)?);
            let backend = Arc::new(RestBackend::new(base_url, api_key)?);
            let slips: Arc<dyn SlipRemote> = backend.clone();
            let tiers: Arc<dyn TierSource> = backend;
            Ok((slips, tiers))
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pickslip=info"));

    let json_logging = std::env::var("PICKSLIP_LOG_JSON").is_ok();

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

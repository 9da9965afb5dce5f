//! VECTOR — Sports Betting Marketplace Core
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database, and serves the API with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use vector::api::{self, ApiState};
use vector::auth::{AcceptNonEmptyVerifier, Authenticator};
use vector::config::AppConfig;
use vector::engine::{BetEngine, PlacementConfig, SettlementEngine};
use vector::storage::Store;

const BANNER: &str = r#"
__     _______ ____ _____ ___  ____
\ \   / / ____/ ___|_   _/ _ \|  _ \
 \ \ / /|  _|| |     | || | | | |_) |
  \ V / | |__| |___  | || |_| |  _ <
   \_/  |_____\____| |_| \___/|_| \_\

  Sports Betting Marketplace Core
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        port = cfg.server.port,
        database = %cfg.database.url,
        min_stake = %cfg.betting.min_stake,
        max_stake = %cfg.betting.max_stake,
        drift_tolerance = %cfg.betting.odds_drift_tolerance,
        "VECTOR starting up"
    );

    // The feed token gates the results/odds endpoints; refuse to start
    // without it rather than serve an open settlement trigger.
    let feed_token = cfg.feed_token()?;

    let store = Store::open(&cfg.database.url).await?;

    let auth = Authenticator::in_memory(
        Arc::new(AcceptNonEmptyVerifier),
        chrono::Duration::seconds(cfg.auth.nonce_ttl_secs as i64),
        chrono::Duration::seconds(cfg.auth.session_ttl_secs as i64),
    );

    let state = Arc::new(ApiState {
        store: store.clone(),
        bets: BetEngine::new(
            store.clone(),
            PlacementConfig {
                min_stake: cfg.betting.min_stake,
                max_stake: cfg.betting.max_stake,
                drift_tolerance: cfg.betting.odds_drift_tolerance,
            },
        ),
        settlements: SettlementEngine::new(store.clone()),
        auth,
        feed_token,
    });

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received.");
    };

    api::serve(state, cfg.server.port, &cfg.server.cors_origin, shutdown).await?;

    info!("VECTOR shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vector=info"));

    let json_logging = std::env::var("VECTOR_LOG_JSON").is_ok();

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

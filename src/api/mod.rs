//! API — thin Axum layer over the core engines.
//!
//! Routes resolve the caller through the Authenticator, translate typed
//! engine rejections into the wire error shape, and never move money
//! themselves. CORS enabled for the web client.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

use crate::auth::Authenticator;
use crate::engine::{BetEngine, SettlementEngine};
use crate::storage::Store;

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub store: Store,
    pub bets: BetEngine,
    pub settlements: SettlementEngine,
    pub auth: Authenticator,
    /// Bearer token required on the results/odds feed endpoints.
    pub feed_token: SecretString,
}

pub type AppState = Arc<ApiState>;

/// Serve the API until shutdown resolves.
pub async fn serve(
    state: AppState,
    port: u16,
    cors_origin: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state, cors_origin);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "API server starting on http://localhost:{port}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API port")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(
            cors_origin
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("*")),
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        // Auth
        .route("/auth/nonce", post(routes::post_nonce))
        .route("/auth/connect", post(routes::post_connect))
        .route("/auth/disconnect", post(routes::post_disconnect))
        // Users
        .route("/users/me", get(routes::get_me))
        .route("/users/me/balance", get(routes::get_balance))
        .route("/users/me/transactions", get(routes::get_transactions))
        // Matches
        .route("/matches", get(routes::list_matches))
        .route("/matches/:id", get(routes::get_match))
        .route("/matches/:id/insight", get(routes::get_insight))
        // Feed (guarded by the feed token)
        .route("/matches/:id/result", post(routes::post_result))
        .route("/matches/:id/void", post(routes::post_void))
        .route("/outcomes/:id/odds", post(routes::post_odds))
        // Bets
        .route("/bets", post(routes::post_bet).get(routes::list_bets))
        .route("/bets/history", get(routes::bet_history))
        .route("/bets/:id", get(routes::get_bet))
        // Health
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

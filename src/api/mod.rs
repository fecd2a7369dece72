//! API: Axum JSON surface over the session.
//!
//! A presentation layer drives the roster, submission and leaderboard
//! through these endpoints. CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use routes::{ApiContext, ApiState};

/// Bind the API port and serve in a background task.
pub async fn spawn_api(state: ApiState, port: u16) -> Result<JoinHandle<()>> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server stopped");
        }
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        // Catalogs
        .route("/api/assets", get(routes::get_assets))
        .route("/api/contests", get(routes::get_contests))
        .route("/api/contests/eligible", get(routes::get_eligible_contests))
        .route("/api/contests/:id/leaderboard", get(routes::get_leaderboard))
        .route("/api/contests/:id/settle", post(routes::settle_contest))
        // Session
        .route("/api/roster", get(routes::get_roster).delete(routes::clear_roster))
        .route("/api/roster/toggle", post(routes::toggle_selection))
        .route("/api/roster/:asset_id", delete(routes::remove_asset))
        .route("/api/submit", post(routes::submit))
        .route("/api/submission/reset", post(routes::reset_submission))
        .route("/api/teams", get(routes::get_my_teams))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

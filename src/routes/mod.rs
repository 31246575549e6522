//! HTTP routes
//!
//! - `/` - the checkout and upload page
//! - `/api/health` - liveness
//! - `/api/payment/*` - Solana Pay checkout
//! - `/api/screenplay/analyze` - paid screenplay critique

pub mod health;
pub mod payment;
pub mod screenplay;
pub mod ui;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let max_upload = state.config.server.max_upload_bytes;
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(ui::router())
        .merge(health::router(state.clone()))
        .merge(payment::router(state.clone()))
        .merge(screenplay::router(state))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

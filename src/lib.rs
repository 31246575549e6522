// Plot Hole - pay-per-critique screenplay analyzer behind a Solana Pay checkout

pub mod config;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod payment;
pub mod routes;
pub mod screenplay;
pub mod session;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}

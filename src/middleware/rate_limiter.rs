// Rate limiting for the expensive endpoints

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::DefaultDirectRateLimiter;
use tracing::debug;

use crate::types::AppError;

/// Reject the request with 429 once the shared quota is used up.
pub async fn rate_limiter_middleware(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if limiter.check().is_err() {
        debug!(path = %req.uri().path(), "Rate limit exceeded");
        return AppError::RateLimited.into_response();
    }
    next.run(req).await
}

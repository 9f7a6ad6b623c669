use axum::{Router, routing::get};

use crate::AppState;
use crate::handlers;

/// Every path other than `/health` is a fetch, matching any method.
pub fn fetch_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .fallback(handlers::fetch)
}

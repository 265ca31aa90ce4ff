//! Router for the bridge.
//!
//! - /health          — liveness probe
//! - /powens/auth     — authorization URL issuance
//! - /powens/callback — deep-link redirect page
//! - /powens/exchange — code-for-token exchange
//! - /powens/*        — data proxies, manual sync, webhook intake

pub mod routes;

use crate::SharedState;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .nest("/powens", routes::powens_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub mod artifacts;
pub mod health;
pub mod jobs;

/// Full API router with CORS and the upload body limit applied.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.server.max_upload_bytes).unwrap_or(usize::MAX);
    let cors = cors_layer(&state.config.server.cors_origins);

    let api = Router::new()
        .merge(health::router())
        .merge(jobs::router())
        .merge(artifacts::router());

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

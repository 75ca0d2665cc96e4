//! Application router: mounted route modules plus the transport layers.

use crate::api;
use crate::error::ConfigError;
use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Mounts every route module. With `strict_routes` any route declaration
/// problem aborts startup; otherwise bad declarations are skipped with a warning.
pub fn build_app(state: &AppState) -> Result<Router, ConfigError> {
    let registry = api::registry(state);
    let router = if state.settings.strict_routes {
        registry.mount_strict()?
    } else {
        registry.mount()
    };
    Ok(router
        .layer(DefaultBodyLimit::max(state.settings.body_limit))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        ))
}

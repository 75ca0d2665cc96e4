//! Common routes: health, readiness, version.

use crate::config::{CustomRoute, RouteConfig};
use crate::routes::middleware::Endpoint;
use crate::store::StoreRef;
use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(store: StoreRef) -> (StatusCode, Json<ReadyBody>) {
    if let Err(e) = store.ping().await {
        tracing::warn!(error = %e, "readiness check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                database: Some("unavailable"),
            }),
        );
    }
    (
        StatusCode::OK,
        Json(ReadyBody {
            status: "ok",
            database: Some("ok"),
        }),
    )
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /ready (store ping), GET /version at the root.
pub fn common_routes(store: StoreRef) -> RouteConfig {
    RouteConfig::new("/")
        .custom("GET /health", CustomRoute::new(Endpoint::new(health)))
        .custom(
            "GET /ready",
            CustomRoute::new(Endpoint::new(move || ready(store.clone()))),
        )
        .custom("GET /version", CustomRoute::new(Endpoint::new(version)))
}

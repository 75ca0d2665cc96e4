//! Storefront server: reads settings, opens the document store and serves the gateway.
//!
//! Run from repo root: `cargo run -p storefront-server`

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use storefront_gateway::{
    build_app, ensure_database_exists, AppState, MemoryStore, PgStore, Settings, StoreRef,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("storefront_gateway=info,tower_http=info")
            }),
        )
        .init();

    let store: StoreRef = match &settings.database_url {
        Some(url) => {
            ensure_database_exists(url).await?;
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            Arc::new(PgStore::new(pool, settings.store_schema.clone()))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; documents are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let addr = settings.listen_addr();
    let state = AppState::new(settings, store.clone())?;
    state.repos.ensure_collections(&store).await?;
    let app = build_app(&state)?;

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("storefront gateway listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

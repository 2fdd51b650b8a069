mod cache;
mod config;
mod error;
mod hashdata;
mod origin;
mod path;
mod store;


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cache::MetadataCache;
use crate::config::OriginConfig;
use crate::store::StoreClient;

/// Shared application state available to all handlers.
pub struct AppState {
    pub config: OriginConfig,
    pub store: StoreClient,
    pub cache: MetadataCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (not required)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cdn_origin=info,tower_http=info".into()),
        )
        .init();

    info!("Starting CDN origin server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; required keys fail startup here
    let config = OriginConfig::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        storage_url = %config.storage_url,
        hash_containers = config.number_hash_id_containers,
        "Configuration loaded"
    );

    let store = StoreClient::new(&config.storage_url, config.storage_admin_token.clone());
    let cache = MetadataCache::new(config.metadata_cache_entries);

    let state = Arc::new(AppState {
        config,
        store,
        cache,
    });

    let app = build_router(state.clone());

    let addr = state.config.listen_addr.parse::<SocketAddr>()?;
    info!("Starting HTTP server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Every request goes through the dispatcher; there is no fixed route table
/// because classification happens on the Host header and path prefix.
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(origin::dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

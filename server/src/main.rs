mod config;
mod db;
mod http;
mod indexer;
mod inspect;
mod service;
mod thumbs;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::db::svc::DbService;
use crate::http::HttpState;
use crate::indexer::IndexerService;
use crate::service::{EntanglementService, ESMRegistry, ServiceType};
use crate::thumbs::ThumbsService;

// the outermost caller should watch each service's task handle and restart
// or exit with a logged error; that lifecycle management isn't built here

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::load()?;
    let registry = ESMRegistry::new();

    DbService::create(config.clone(), &registry).start(&registry).await?;
    ThumbsService::create(config.clone(), &registry).start(&registry).await?;
    IndexerService::create(config.clone(), &registry).start(&registry).await?;

    let state = Arc::new(HttpState {
        config: config.clone(),
        db_tx: registry.get(&ServiceType::Db)?,
        indexer_tx: registry.get(&ServiceType::Indexer)?,
        thumbs_tx: registry.get(&ServiceType::Thumbs)?,
    });

    let router = Router::new()
        .route("/api/resources", get(http::api::get_resources))
        .route("/api/authors", get(http::api::get_authors))
        .route("/api/tags", get(http::api::get_tags))
        .route(
            "/api/reindex",
            get(http::api::reindex).post(http::api::reindex),
        )
        .route(
            "/api/config",
            get(http::api::get_config).post(http::api::post_config),
        )
        .route("/api/delete", post(http::api::post_delete))
        .route("/api/inspect", get(http::api::get_inspect))
        .route("/api/cache/stats", get(http::api::get_cache_stats))
        .route(
            "/api/cache/clear/thumbs",
            post(http::api::post_cache_clear_thumbs),
        )
        .route("/api/cache/cleanup", post(http::api::post_cache_cleanup))
        .route("/media/{dirId}/{*relPath}", get(http::stream::stream_media))
        .route("/thumb/{dirId}/{*relPath}", get(http::stream::stream_thumb))
        .route("/vthumb/{dirId}/{*relPath}", get(http::stream::stream_vthumb))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, router).await?;

    Ok(())
}

//! The request-handler binary: serves the tool-layer HTTP surface
//! (`remember`/`recall`/`forget`/`status` plus liveness/readiness) over
//! `axum`. Grounded in the teacher's `main/src/server.rs` tracing bootstrap
//! and config loading, retargeted onto this workspace's `ApiState` and
//! `RetrievalService` instead of the teacher's `StorageManager`/html router
//! (spec §1 "Out of Scope": no server-rendered UI in this tool surface).

use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use common::{
    storage::db::SurrealDbClient,
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use retrieval_pipeline::{DefaultQueryEmbedder, RetrievalConfig, RetrievalService};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let openai_client = async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    );

    let embedding_provider = Arc::new(EmbeddingProvider::from_config(
        &config,
        Some(openai_client),
    )?);
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "embedding provider initialized"
    );

    let retrieval = Arc::new(RetrievalService::new(
        db.clone(),
        RetrievalConfig::from(&config),
        Arc::new(DefaultQueryEmbedder::new(embedding_provider.clone())),
    ));

    let api_state = ApiState::new(db, config.clone(), embedding_provider, retrieval);

    let app = api_routes_v1(&api_state).with_state(api_state);

    info!("starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! The worker binary: claims `extract`/`graph_upsert` jobs (spec §4.6) and
//! runs them via `IngestionPipeline`, alongside a reaper loop that returns
//! jobs whose lease has expired. Grounded in the teacher's
//! `main/src/worker.rs` tracing bootstrap and config loading, retargeted
//! onto this workspace's `Job`-typed worker loop instead of the teacher's
//! single-task `IngestionTask` analysis loop.

use std::sync::Arc;

use common::{
    storage::db::SurrealDbClient,
    utils::{config::get_config, embedding::EmbeddingProvider, llm::LlmClient},
};
use ingestion_pipeline::{
    pipeline::{DefaultPipelineServices, IngestionConfig, IngestionPipeline},
    run_reaper_loop, run_worker_loop,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CHAT_MODEL: &str = "gpt-4o-mini";
const REAPER_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
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
        Some(openai_client.clone()),
    )?);
    let llm_client = Arc::new(LlmClient::from_config(&config, openai_client, CHAT_MODEL));
    let services = Arc::new(DefaultPipelineServices::new(embedding_provider, llm_client));

    let ingestion_config = IngestionConfig::from(&config);
    let lease_seconds = config.job_lease_seconds as i64;
    let backoff_base_seconds = config.job_backoff_base_seconds;

    let pipeline = Arc::new(IngestionPipeline::new(db.clone(), ingestion_config, services));

    let worker = tokio::spawn(run_worker_loop(db.clone(), pipeline, lease_seconds));
    let reaper = tokio::spawn(run_reaper_loop(
        db,
        lease_seconds,
        backoff_base_seconds,
        REAPER_INTERVAL,
    ));

    tokio::select! {
        result = worker => result??,
        result = reaper => result??,
    }

    Ok(())
}

//! Shared state for the tool-layer router: the relational/vector store
//! handle, config, and the two request-path capabilities `remember` and
//! `recall` need (an embedder to chunk-embed new content, and the
//! retrieval service recall delegates to). Grounded in this file's
//! previous `ApiState::new` shape, retargeted off `StorageManager` (no
//! longer part of the common crate) onto the embedding/retrieval stack.

use std::sync::Arc;

use common::{
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use retrieval_pipeline::RetrievalService;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub embedding_provider: Arc<EmbeddingProvider>,
    pub retrieval: Arc<RetrievalService>,
}

impl ApiState {
    /// Takes the already-connected `db` handle rather than opening its own
    /// connection, so the api-router, the worker, and `RetrievalService`
    /// (built from the same `db`) all observe one relational store.
    pub const fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        embedding_provider: Arc<EmbeddingProvider>,
        retrieval: Arc<RetrievalService>,
    ) -> Self {
        Self {
            db,
            config,
            embedding_provider,
            retrieval,
        }
    }
}

//! Provider boundary `recall` calls through to turn a query string into a
//! vector, grounded in the ingestion pipeline's `PipelineServices` shape
//! but narrowed to the single capability retrieval needs. Kept as a trait
//! object so tests can substitute a `mockall`-generated mock instead of
//! loading an embedding model.

use std::sync::Arc;

use async_trait::async_trait;
use common::{error::AppError, utils::embedding::EmbeddingProvider};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

#[allow(clippy::module_name_repetitions)]
pub struct DefaultQueryEmbedder {
    embedding_provider: Arc<EmbeddingProvider>,
}

impl DefaultQueryEmbedder {
    pub const fn new(embedding_provider: Arc<EmbeddingProvider>) -> Self {
        Self { embedding_provider }
    }
}

#[async_trait]
impl QueryEmbedder for DefaultQueryEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embedding_provider.embed(text).await
    }
}

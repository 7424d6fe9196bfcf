//! Minimal provider boundary the Entity Resolver and Event Extractor call
//! through, grounded in `ingestion-pipeline/src/pipeline/services.rs`'s
//! dependency-injection shape but narrowed to the two outbound capabilities
//! the extraction worker actually needs: embedding text and running a
//! schema-constrained LLM completion. Kept as a trait object so tests can
//! substitute a `mockall`-generated mock instead of making network calls.

use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    utils::{embedding::EmbeddingProvider, llm::LlmClient},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, AppError>;
}

#[allow(clippy::module_name_repetitions)]
pub struct DefaultPipelineServices {
    embedding_provider: Arc<EmbeddingProvider>,
    llm_client: Arc<LlmClient>,
}

impl DefaultPipelineServices {
    pub const fn new(embedding_provider: Arc<EmbeddingProvider>, llm_client: Arc<LlmClient>) -> Self {
        Self {
            embedding_provider,
            llm_client,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embedding_provider.embed(text).await
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        self.llm_client
            .complete(system_prompt, user_prompt, schema_name, schema)
            .await
    }
}

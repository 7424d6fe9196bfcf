use async_openai::types::CreateEmbeddingRequestArgs;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;
use tokio::time::timeout;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

use crate::{
    error::AppError,
    utils::config::{AppConfig, EmbeddingBackend},
};

/// Dimension used for OpenAI's `text-embedding-3-large`, the backend the
/// spec's §3.1 `Entity.context_embedding: Vector<3072>` field assumes.
pub const OPENAI_EMBEDDING_DIMENSION: u32 = 3_072;
const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-large";
/// Spec §4.1: "base 1 s, cap 30 s, max 3 attempts".
const RETRY_ATTEMPTS: usize = 3;
const RETRY_BASE_MS: u64 = 1_000;
const RETRY_CAP_MS: u64 = 30_000;

enum Backend {
    OpenAi {
        client: async_openai::Client<async_openai::config::OpenAIConfig>,
        model: String,
        dimension: u32,
    },
    FastEmbed {
        model: Mutex<TextEmbedding>,
        dimension: u32,
    },
}

/// Backend-agnostic text → vector provider.
///
/// Mirrors the shape the rest of the workspace already depends on
/// (`dimension()`, `backend_label()`, `embed()`/`embed_batch()`): every
/// caller treats embeddings as an opaque remote capability with timeout and
/// retry, never reaching into OpenAI- or FastEmbed-specific types.
pub struct EmbeddingProvider {
    backend: Backend,
    timeout_secs: u64,
}

impl EmbeddingProvider {
    pub fn from_config(
        config: &AppConfig,
        openai_client: Option<async_openai::Client<async_openai::config::OpenAIConfig>>,
    ) -> Result<Self, AppError> {
        let backend = match config.embedding_backend {
            EmbeddingBackend::OpenAi => {
                let client = openai_client.ok_or_else(|| {
                    AppError::InternalError(
                        "openai embedding backend selected without an OpenAI client".into(),
                    )
                })?;
                Backend::OpenAi {
                    client,
                    model: OPENAI_EMBEDDING_MODEL.to_string(),
                    dimension: OPENAI_EMBEDDING_DIMENSION,
                }
            }
            EmbeddingBackend::FastEmbed => Self::fastembed_backend()?,
        };

        Ok(Self {
            backend,
            timeout_secs: config.embedding_timeout_seconds,
        })
    }

    /// Always-FastEmbed constructor for tests, bypassing `AppConfig`.
    pub fn new_fastembed() -> Result<Self, AppError> {
        Ok(Self {
            backend: Self::fastembed_backend()?,
            timeout_secs: 10,
        })
    }

    fn fastembed_backend() -> Result<Backend, AppError> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| AppError::InternalError(format!("failed to load FastEmbed model: {e}")))?;

        Ok(Backend::FastEmbed {
            model: Mutex::new(model),
            dimension: 384,
        })
    }

    pub fn dimension(&self) -> u32 {
        match &self.backend {
            Backend::OpenAi { dimension, .. } | Backend::FastEmbed { dimension, .. } => *dimension,
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match &self.backend {
            Backend::OpenAi { .. } => "openai",
            Backend::FastEmbed { .. } => "fastembed",
        }
    }

    /// Embeds a single string, retrying transient failures with jittered
    /// exponential backoff, bounded by the configured timeout.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let vectors = self.embed_batch(std::slice::from_ref(&input)).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::TransientEmbedding("embedding backend returned no vectors".into()))
    }

    pub async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let strategy = ExponentialBackoff::from_millis(RETRY_BASE_MS)
            .max_delay(std::time::Duration::from_millis(RETRY_CAP_MS))
            .map(jitter)
            .take(RETRY_ATTEMPTS);

        let owned: Vec<String> = inputs.iter().map(|s| (*s).to_string()).collect();
        let result = Retry::spawn(strategy, || self.embed_batch_once(&owned)).await;

        match result {
            Ok(vectors) => Ok(vectors),
            Err(err) => {
                warn!(error = %err, attempts = RETRY_ATTEMPTS, "embedding request exhausted retries");
                Err(err)
            }
        }
    }

    async fn embed_batch_once(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let duration = std::time::Duration::from_secs(self.timeout_secs);
        match timeout(duration, self.embed_batch_inner(inputs)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::TransientEmbedding(format!(
                "embedding request timed out after {}s",
                self.timeout_secs
            ))),
        }
    }

    async fn embed_batch_inner(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        match &self.backend {
            Backend::OpenAi { client, model, .. } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model)
                    .input(inputs.to_vec())
                    .build()
                    .map_err(AppError::OpenAI)?;

                let response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(|e| AppError::TransientEmbedding(e.to_string()))?;

                debug!(count = response.data.len(), "embedding batch completed");
                Ok(response.data.into_iter().map(|d| d.embedding).collect())
            }
            Backend::FastEmbed { model, .. } => {
                let inputs = inputs.to_vec();
                tokio::task::block_in_place(|| {
                    let mut guard = model
                        .lock()
                        .map_err(|_| AppError::InternalError("fastembed model lock poisoned".into()))?;
                    guard
                        .embed(inputs, None)
                        .map_err(|e| AppError::TransientEmbedding(format!("fastembed failure: {e}")))
                })
            }
        }
    }
}

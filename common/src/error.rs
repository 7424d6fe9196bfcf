use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Core internal error type shared by every crate in the workspace.
///
/// Route handlers never return this directly; `api-router::error::ApiError`
/// maps each variant onto the stable `{kind, message}` tool-error envelope
/// and strips anything that should not reach a client (see §7 error table).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    /// Embedding backend timed out or returned a 5xx; the job should retry.
    #[error("Transient embedding error: {0}")]
    TransientEmbedding(String),
    /// LLM returned content that could not be parsed or repaired into the
    /// expected JSON schema.
    #[error("LLM returned invalid structured output: {0}")]
    LLMInvalidResponse(String),
    /// LLM provider rate-limited the request; retryable with backoff.
    #[error("LLM rate limited: {0}")]
    LLMRateLimited(String),
    /// LLM call exceeded its configured timeout; retryable.
    #[error("LLM request timed out: {0}")]
    LLMTimeout(String),
    /// Another worker has already claimed or transitioned this job.
    #[error("Job claim conflict: {0}")]
    JobConflict(String),
    /// Graph materialization could not complete (store unavailable); the
    /// relational data it derives from is unaffected.
    #[error("Graph store unavailable: {0}")]
    GraphUnavailable(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether retrying the operation that produced this error might
    /// succeed. Used by the Job Queue to decide PENDING-retry vs FAILED.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::InvalidInput(_) | AppError::Validation(_) | AppError::NotFound(_)
        )
    }
}

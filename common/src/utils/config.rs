use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Which embedding backend to use. `OpenAi` calls out to the configured
/// OpenAI-compatible endpoint; `FastEmbed` runs a local ONNX model and is
/// what tests and offline deployments default to.
#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAi,
    FastEmbed,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::OpenAi
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackend,

    // §6.4 environment knobs, all with the spec's stated defaults.
    #[serde(default = "default_single_piece_max_tokens")]
    pub single_piece_max_tokens: usize,
    #[serde(default = "default_chunk_target_tokens")]
    pub chunk_target_tokens: usize,
    #[serde(default = "default_chunk_overlap_tokens")]
    pub chunk_overlap_tokens: usize,

    #[serde(default = "default_entity_similarity_threshold")]
    pub entity_similarity_threshold: f32,
    #[serde(default = "default_entity_max_candidates")]
    pub entity_max_candidates: usize,

    #[serde(default = "default_graph_query_timeout_ms")]
    pub graph_query_timeout_ms: u64,
    #[serde(default = "default_graph_expansion_budget")]
    pub graph_expansion_budget: usize,
    #[serde(default = "default_graph_seed_limit")]
    pub graph_seed_limit: usize,

    #[serde(default = "default_job_lease_seconds")]
    pub job_lease_seconds: u64,
    #[serde(default = "default_job_max_attempts")]
    pub job_max_attempts: u32,
    #[serde(default = "default_job_backoff_base_seconds")]
    pub job_backoff_base_seconds: u64,
    #[serde(default = "default_job_backoff_cap_seconds")]
    pub job_backoff_cap_seconds: u64,

    #[serde(default = "default_llm_timeout_seconds")]
    pub llm_timeout_seconds: u64,
    #[serde(default = "default_embedding_timeout_seconds")]
    pub embedding_timeout_seconds: u64,

    #[serde(default = "default_vector_distance_cutoff")]
    pub vector_distance_cutoff: f32,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_single_piece_max_tokens() -> usize {
    1_200
}
fn default_chunk_target_tokens() -> usize {
    900
}
fn default_chunk_overlap_tokens() -> usize {
    100
}
fn default_entity_similarity_threshold() -> f32 {
    0.85
}
fn default_entity_max_candidates() -> usize {
    5
}
fn default_graph_query_timeout_ms() -> u64 {
    500
}
fn default_graph_expansion_budget() -> usize {
    10
}
fn default_graph_seed_limit() -> usize {
    5
}
fn default_job_lease_seconds() -> u64 {
    300
}
fn default_job_max_attempts() -> u32 {
    5
}
fn default_job_backoff_base_seconds() -> u64 {
    60
}
fn default_job_backoff_cap_seconds() -> u64 {
    3_600
}
fn default_llm_timeout_seconds() -> u64 {
    30
}
fn default_embedding_timeout_seconds() -> u64 {
    10
}
fn default_vector_distance_cutoff() -> f32 {
    0.55
}
fn default_rrf_k() -> u32 {
    60
}

/// Loads configuration from an optional `config.toml`/`config.yaml` in the
/// working directory, overlaid with environment variables. Returns a plain
/// value rather than a global singleton; callers own where it lives.
pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    /// Builds a config suitable for in-memory tests: a `mem://` SurrealDB
    /// target and the FastEmbed backend so tests never touch the network.
    pub fn for_tests(namespace: &str, database: &str) -> Self {
        Self {
            openai_api_key: "test-key".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            http_port: 0,
            openai_base_url: "https://example.invalid".into(),
            embedding_backend: EmbeddingBackend::FastEmbed,
            single_piece_max_tokens: default_single_piece_max_tokens(),
            chunk_target_tokens: default_chunk_target_tokens(),
            chunk_overlap_tokens: default_chunk_overlap_tokens(),
            entity_similarity_threshold: default_entity_similarity_threshold(),
            entity_max_candidates: default_entity_max_candidates(),
            graph_query_timeout_ms: default_graph_query_timeout_ms(),
            graph_expansion_budget: default_graph_expansion_budget(),
            graph_seed_limit: default_graph_seed_limit(),
            job_lease_seconds: default_job_lease_seconds(),
            job_max_attempts: default_job_max_attempts(),
            job_backoff_base_seconds: default_job_backoff_base_seconds(),
            job_backoff_cap_seconds: default_job_backoff_cap_seconds(),
            llm_timeout_seconds: default_llm_timeout_seconds(),
            embedding_timeout_seconds: default_embedding_timeout_seconds(),
            vector_distance_cutoff: default_vector_distance_cutoff(),
            rrf_k: default_rrf_k(),
        }
    }
}

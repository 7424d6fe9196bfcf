use common::utils::config::AppConfig;

/// Tuning knobs for the extraction pipeline, derived from `AppConfig`
/// (spec §6.4) plus the retry-delay constants the worker loop needs when a
/// job fails transiently.
#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,
    pub retry_backoff_cap_exponent: u32,
    pub single_piece_max_tokens: usize,
    pub chunk_target_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub entity_similarity_threshold: f32,
    pub entity_max_candidates: usize,
    pub job_max_attempts: u32,
}

impl From<&AppConfig> for IngestionTuning {
    fn from(config: &AppConfig) -> Self {
        Self {
            retry_base_delay_secs: config.job_backoff_base_seconds,
            retry_max_delay_secs: config.job_backoff_cap_seconds,
            retry_backoff_cap_exponent: 6,
            single_piece_max_tokens: config.single_piece_max_tokens,
            chunk_target_tokens: config.chunk_target_tokens,
            chunk_overlap_tokens: config.chunk_overlap_tokens,
            entity_similarity_threshold: config.entity_similarity_threshold,
            entity_max_candidates: config.entity_max_candidates,
            job_max_attempts: config.job_max_attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
}

impl From<&AppConfig> for IngestionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            tuning: IngestionTuning::from(config),
        }
    }
}

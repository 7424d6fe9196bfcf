use common::utils::config::AppConfig;

/// Tuning knobs for `recall`, derived from `AppConfig` (spec §6.4). Mirrors
/// the ingestion pipeline's `IngestionTuning` — a plain `From<&AppConfig>`
/// struct rather than a global, so a test can build one without touching
/// the environment.
#[derive(Debug, Clone)]
pub struct RetrievalTuning {
    pub distance_cutoff: f32,
    pub rrf_k: f32,
    pub graph_query_timeout_ms: u64,
    pub graph_expansion_budget: usize,
    pub graph_seed_limit: usize,
}

impl From<&AppConfig> for RetrievalTuning {
    fn from(config: &AppConfig) -> Self {
        Self {
            distance_cutoff: config.vector_distance_cutoff,
            #[allow(clippy::cast_precision_loss)]
            rrf_k: config.rrf_k as f32,
            graph_query_timeout_ms: config.graph_query_timeout_ms,
            graph_expansion_budget: config.graph_expansion_budget,
            graph_seed_limit: config.graph_seed_limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub tuning: RetrievalTuning,
}

impl From<&AppConfig> for RetrievalConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            tuning: RetrievalTuning::from(config),
        }
    }
}

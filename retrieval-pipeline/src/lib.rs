#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod graph_expander;
pub mod pipeline;
pub mod scoring;

pub use pipeline::{
    DefaultQueryEmbedder, EntitySummary, EvidenceRef, ExpandOption, PrimaryResult, QueryEmbedder,
    RecallRequest, RecallResponse, RelatedContextItem, ResultType, RetrievalConfig, RetrievalService,
    RetrievalTuning,
};

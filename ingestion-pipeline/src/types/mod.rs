#![allow(clippy::missing_docs_in_private_items)]
//! In-flight extraction types (spec §6.2 Prompt A/B contracts). These are
//! never stored directly — the Event Extractor and Entity Resolver turn
//! them into the `StoredObject` rows in `common::storage::types` once
//! entities have been resolved.

use chrono::{DateTime, Utc};
use common::storage::types::event_links::ActorRole;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedEvidence {
    pub quote: String,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedSubject {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(rename = "ref")]
    pub surface_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedActor {
    #[serde(rename = "ref")]
    pub surface_ref: String,
    pub role: ActorRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedEvent {
    pub category: String,
    pub narrative: String,
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    pub subject: ExtractedSubject,
    #[serde(default)]
    pub actors: Vec<ExtractedActor>,
    pub evidence: ExtractedEvidence,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextClues {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedMention {
    pub surface_form: String,
    pub canonical_suggestion: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub context_clues: ContextClues,
    #[serde(default)]
    pub aliases_in_doc: Vec<String>,
    pub confidence: f32,
    #[serde(default)]
    pub start_char: Option<usize>,
    #[serde(default)]
    pub end_char: Option<usize>,
}

/// Prompt A's response shape: everything one chunk yielded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkExtraction {
    #[serde(default)]
    pub events: Vec<ExtractedEvent>,
    #[serde(default)]
    pub entities_mentioned: Vec<ExtractedMention>,
}

/// Prompt B's response shape: the Entity Resolver's merge-confirmation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeDecision {
    Same,
    Different,
    Uncertain,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfirmation {
    pub decision: MergeDecision,
    pub canonical_name: String,
    pub reason: String,
}

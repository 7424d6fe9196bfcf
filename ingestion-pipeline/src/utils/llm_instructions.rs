#![allow(clippy::missing_docs_in_private_items)]
//! Prompt/schema builders for the two LLM contracts (spec §6.2). Grounded in
//! `ingestion-pipeline/src/utils/llm_instructions.rs`'s
//! `get_ingress_analysis_schema` shape, retargeted at the extraction and
//! merge-confirmation schemas.

use common::storage::types::semantic_event::KNOWN_CATEGORIES;
use serde_json::{json, Value};

pub const EXTRACTION_SYSTEM_MESSAGE: &str = "You extract structured events and entity mentions \
from a single chunk of a larger document. Only report events and mentions that are explicitly \
supported by the chunk text; quote evidence verbatim with exact character offsets into the chunk. \
Use the known category taxonomy when a category fits; otherwise choose a short, specific label. \
Never invent names, dates, or relationships that are not present in the text.";

pub const MERGE_CONFIRMATION_SYSTEM_MESSAGE: &str = "You decide whether two entity records \
describe the same real-world person, organization, project, object, or place. Compare names, \
types, and surrounding context. Answer \"same\" only when you are confident; otherwise answer \
\"uncertain\" rather than guessing, and answer \"different\" only when the context clearly rules \
out a match.";

/// Prompt A — per-chunk extraction (spec §6.2).
pub fn extraction_schema() -> Value {
    let mut categories: Vec<&str> = KNOWN_CATEGORIES.to_vec();
    categories.push("Other");

    json!({
        "type": "object",
        "properties": {
            "events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": { "type": "string", "enum": categories },
                        "narrative": { "type": "string" },
                        "event_time": { "type": ["string", "null"] },
                        "subject": {
                            "type": "object",
                            "properties": {
                                "type": { "type": "string" },
                                "ref": { "type": "string" }
                            },
                            "required": ["type", "ref"],
                            "additionalProperties": false
                        },
                        "actors": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "ref": { "type": "string" },
                                    "role": {
                                        "type": "string",
                                        "enum": ["owner", "contributor", "reviewer", "stakeholder", "other"]
                                    }
                                },
                                "required": ["ref", "role"],
                                "additionalProperties": false
                            }
                        },
                        "evidence": {
                            "type": "object",
                            "properties": {
                                "quote": { "type": "string" },
                                "start_char": { "type": "integer" },
                                "end_char": { "type": "integer" }
                            },
                            "required": ["quote", "start_char", "end_char"],
                            "additionalProperties": false
                        },
                        "confidence": { "type": "number" }
                    },
                    "required": ["category", "narrative", "subject", "actors", "evidence", "confidence"],
                    "additionalProperties": false
                }
            },
            "entities_mentioned": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "surface_form": { "type": "string" },
                        "canonical_suggestion": { "type": "string" },
                        "type": {
                            "type": "string",
                            "enum": ["person", "org", "project", "object", "place", "other"]
                        },
                        "context_clues": {
                            "type": "object",
                            "properties": {
                                "role": { "type": ["string", "null"] },
                                "org": { "type": ["string", "null"] },
                                "email": { "type": ["string", "null"] }
                            },
                            "additionalProperties": false
                        },
                        "aliases_in_doc": { "type": "array", "items": { "type": "string" } },
                        "confidence": { "type": "number" },
                        "start_char": { "type": ["integer", "null"] },
                        "end_char": { "type": ["integer", "null"] }
                    },
                    "required": ["surface_form", "canonical_suggestion", "type", "confidence"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["events", "entities_mentioned"],
        "additionalProperties": false
    })
}

pub fn build_extraction_user_prompt(
    document_title: &str,
    artifact_type: &str,
    chunk_index: usize,
    total_chunks: usize,
    chunk_text: &str,
) -> String {
    format!(
        "Document title: {document_title}\nDocument type: {artifact_type}\nChunk {chunk_index_display} of {total_chunks}\nChunk text:\n{chunk_text}",
        chunk_index_display = chunk_index + 1,
    )
}

/// Prompt B — merge confirmation (spec §6.2, §4.7).
pub fn merge_confirmation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "decision": { "type": "string", "enum": ["same", "different", "uncertain"] },
            "canonical_name": { "type": "string" },
            "reason": { "type": "string" }
        },
        "required": ["decision", "canonical_name", "reason"],
        "additionalProperties": false
    })
}

#[allow(clippy::too_many_arguments)]
pub fn build_merge_confirmation_user_prompt(
    candidate_name: &str,
    candidate_type: &str,
    candidate_context: &str,
    candidate_source_title: &str,
    new_name: &str,
    new_type: &str,
    new_context: &str,
    new_source_title: &str,
) -> String {
    format!(
        "Entity A:\nname: {candidate_name}\ntype: {candidate_type}\ncontext: {candidate_context}\nsource document: {candidate_source_title}\n\nEntity B:\nname: {new_name}\ntype: {new_type}\ncontext: {new_context}\nsource document: {new_source_title}\n\nAre Entity A and Entity B the same real-world entity?"
    )
}

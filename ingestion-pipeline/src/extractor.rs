//! Event Extractor (spec §4.8): runs Prompt A over every chunk of a
//! revision, deterministically folds duplicate events raised by adjacent
//! chunks, resolves every mentioned entity through the `EntityResolver`,
//! and commits the result atomically via `replace_events`. Split into the
//! four stages the state machine drives (`fetch_chunks`/`extract`/
//! `resolve`/`commit`), grounded in the old teacher `stages/mod.rs`'s
//! per-stage-function shape.

use std::collections::HashMap;

use common::error::AppError;
use common::storage::{
    db::SurrealDbClient,
    relational::{replace_events, RevisionEvents},
    types::{
        entity::normalize_name,
        evidence::Evidence,
        event_links::{ActorRole, EventActor, EventSubject},
        semantic_event::SemanticEvent,
    },
    vector::{VectorHit, VectorNamespace, VectorStoreGateway},
};
use tracing::warn;

use crate::pipeline::services::PipelineServices;
use crate::resolver::EntityResolver;
use crate::types::{ChunkExtraction, ContextClues, ExtractedEvent, ExtractedMention};
use crate::utils::llm_instructions::{
    build_extraction_user_prompt, extraction_schema, EXTRACTION_SYSTEM_MESSAGE,
};

/// A chunk-scoped event, carried until cross-chunk folding collapses
/// duplicates and entity references are resolved to stored ids.
pub struct PendingEvent {
    category: String,
    narrative: String,
    event_time: Option<chrono::DateTime<chrono::Utc>>,
    confidence: f32,
    subject_surface: String,
    subject_type: String,
    actors: Vec<(String, ActorRole)>,
    evidence_quote: String,
    evidence_start: usize,
    evidence_end: usize,
    chunk_id: Option<String>,
}

/// Everything the `extract` stage produced, carried into `resolve`/`commit`.
#[derive(Default)]
pub struct ExtractionDraft {
    pending_events: Vec<PendingEvent>,
    mentions_by_surface: HashMap<String, ExtractedMention>,
}

impl ExtractionDraft {
    pub fn event_count(&self) -> usize {
        self.pending_events.len()
    }

    pub fn mention_count(&self) -> usize {
        self.mentions_by_surface.len()
    }
}

pub struct EventExtractor<'a> {
    db: &'a SurrealDbClient,
    services: &'a dyn PipelineServices,
    entity_similarity_threshold: f32,
    entity_max_candidates: usize,
}

impl<'a> EventExtractor<'a> {
    pub const fn new(
        db: &'a SurrealDbClient,
        services: &'a dyn PipelineServices,
        entity_similarity_threshold: f32,
        entity_max_candidates: usize,
    ) -> Self {
        Self {
            db,
            services,
            entity_similarity_threshold,
            entity_max_candidates,
        }
    }

    /// `Claimed -> ChunksFetched`: reads back the revision's
    /// already-chunked-and-embedded content.
    pub async fn fetch_chunks(
        &self,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<Vec<VectorHit>, AppError> {
        let gateway = VectorStoreGateway::new(self.db);
        gateway
            .list_by_revision(VectorNamespace::Chunks, artifact_uid, revision_id)
            .await
    }

    /// `ChunksFetched -> Extracted`: runs Prompt A per chunk and folds
    /// duplicate events raised by overlapping chunks.
    pub async fn extract(
        &self,
        chunks: &[VectorHit],
        artifact_type: &str,
        document_title: &str,
    ) -> Result<ExtractionDraft, AppError> {
        let total_chunks = chunks.len().max(1);
        let mut pending: Vec<PendingEvent> = Vec::new();
        let mut mentions_by_surface: HashMap<String, ExtractedMention> = HashMap::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let prompt = build_extraction_user_prompt(
                document_title,
                artifact_type,
                index,
                total_chunks,
                &chunk.text,
            );

            let value = match self
                .services
                .complete(
                    EXTRACTION_SYSTEM_MESSAGE,
                    &prompt,
                    "chunk_extraction",
                    extraction_schema(),
                )
                .await
            {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, chunk_index = index, "extraction failed for chunk; skipping it");
                    continue;
                }
            };

            let extraction: ChunkExtraction = serde_json::from_value(value).map_err(|e| {
                AppError::LLMInvalidResponse(format!("invalid chunk extraction: {e}"))
            })?;

            for mention in extraction.entities_mentioned {
                let key = normalize_name(&mention.surface_form);
                mentions_by_surface.entry(key).or_insert(mention);
            }

            for event in extraction.events {
                pending.push(to_pending_event(event, chunk.id.clone()));
            }
        }

        Ok(ExtractionDraft {
            pending_events: fold_duplicate_events(pending),
            mentions_by_surface,
        })
    }

    /// `Extracted -> Resolved`: resolves every mentioned entity, keyed by
    /// normalized surface form so event actor/subject refs can look
    /// themselves up without re-running resolution per reference.
    pub async fn resolve(
        &self,
        draft: &ExtractionDraft,
        artifact_uid: &str,
        revision_id: &str,
        document_title: &str,
    ) -> Result<HashMap<String, String>, AppError> {
        let resolver = EntityResolver::new(
            self.db,
            self.services,
            self.entity_similarity_threshold,
            self.entity_max_candidates,
        );

        let mut resolved = HashMap::new();
        for (surface_key, mention) in &draft.mentions_by_surface {
            let outcome = resolver
                .resolve_mention(mention, artifact_uid, revision_id, document_title)
                .await?;
            resolved.insert(surface_key.clone(), outcome.entity_id);
        }
        Ok(resolved)
    }

    /// `Resolved -> Committed`: builds the event/evidence/actor/subject rows
    /// from the draft plus the resolved entity map and atomically swaps
    /// them in via `replace_events`.
    pub async fn commit(
        &self,
        draft: ExtractionDraft,
        resolved_entities: &HashMap<String, String>,
        artifact_uid: &str,
        revision_id: &str,
        document_title: &str,
        extraction_run_id: &str,
    ) -> Result<usize, AppError> {
        let mut events = Vec::with_capacity(draft.pending_events.len());
        let mut evidence = Vec::with_capacity(draft.pending_events.len());
        let mut actors = Vec::new();
        let mut subjects = Vec::new();

        for pending_event in draft.pending_events {
            let event = SemanticEvent::new(
                artifact_uid.to_owned(),
                revision_id.to_owned(),
                pending_event.category,
                pending_event.narrative,
                pending_event.event_time,
                pending_event.confidence,
                extraction_run_id.to_owned(),
            );

            match Evidence::new(
                event.id.clone(),
                artifact_uid.to_owned(),
                revision_id.to_owned(),
                pending_event.chunk_id,
                pending_event.evidence_start,
                pending_event.evidence_end,
                pending_event.evidence_quote,
            ) {
                Ok(evidence_row) => evidence.push(evidence_row),
                Err(err) => {
                    warn!(error = %err, event_id = %event.id, "dropping malformed evidence span");
                }
            }

            if let Some(entity_id) = self
                .resolve_reference(
                    resolved_entities,
                    &pending_event.subject_surface,
                    &pending_event.subject_type,
                    artifact_uid,
                    revision_id,
                    document_title,
                )
                .await?
            {
                subjects.push(EventSubject::new(event.id.clone(), entity_id));
            }

            for (actor_surface, role) in pending_event.actors {
                if let Some(entity_id) = self
                    .resolve_reference(
                        resolved_entities,
                        &actor_surface,
                        "person",
                        artifact_uid,
                        revision_id,
                        document_title,
                    )
                    .await?
                {
                    actors.push(EventActor::new(event.id.clone(), entity_id, role));
                }
            }

            events.push(event);
        }

        let event_count = events.len();

        replace_events(
            self.db,
            artifact_uid,
            revision_id,
            RevisionEvents {
                events,
                evidence,
                actors,
                subjects,
            },
        )
        .await?;

        Ok(event_count)
    }

    /// Resolves a bare surface-form reference (an event's subject or actor
    /// ref) against entities already resolved from this revision's mention
    /// list, falling back to resolving it directly when the model named an
    /// actor/subject it forgot to also list under `entities_mentioned`.
    async fn resolve_reference(
        &self,
        resolved_entities: &HashMap<String, String>,
        surface_form: &str,
        entity_type: &str,
        artifact_uid: &str,
        revision_id: &str,
        document_title: &str,
    ) -> Result<Option<String>, AppError> {
        let key = normalize_name(surface_form);
        if let Some(id) = resolved_entities.get(&key) {
            return Ok(Some(id.clone()));
        }

        let resolver = EntityResolver::new(
            self.db,
            self.services,
            self.entity_similarity_threshold,
            self.entity_max_candidates,
        );
        let fallback_mention = ExtractedMention {
            surface_form: surface_form.to_owned(),
            canonical_suggestion: surface_form.to_owned(),
            entity_type: entity_type.to_owned(),
            context_clues: ContextClues::default(),
            aliases_in_doc: Vec::new(),
            confidence: 0.5,
            start_char: None,
            end_char: None,
        };
        let outcome = resolver
            .resolve_mention(&fallback_mention, artifact_uid, revision_id, document_title)
            .await?;
        Ok(Some(outcome.entity_id))
    }
}

fn to_pending_event(event: ExtractedEvent, chunk_id: Option<String>) -> PendingEvent {
    PendingEvent {
        category: event.category,
        narrative: event.narrative,
        event_time: event.event_time,
        confidence: event.confidence,
        subject_surface: event.subject.surface_ref,
        subject_type: event.subject.entity_type,
        actors: event
            .actors
            .into_iter()
            .map(|actor| (actor.surface_ref, actor.role))
            .collect(),
        evidence_quote: event.evidence.quote,
        evidence_start: event.evidence.start_char,
        evidence_end: event.evidence.end_char,
        chunk_id,
    }
}

/// Deterministic cross-chunk canonicalization (spec §4.8): two events fold
/// into one when they share a normalized subject, the same set of actor
/// surface forms, and a near-identical narrative, which happens when
/// chunk overlap causes the same sentence to be extracted twice. No second
/// LLM call is made for this — it is a plain similarity check, not an
/// entity merge decision.
fn fold_duplicate_events(pending: Vec<PendingEvent>) -> Vec<PendingEvent> {
    let mut folded: Vec<PendingEvent> = Vec::new();
    'outer: for candidate in pending {
        for existing in &folded {
            if is_duplicate(existing, &candidate) {
                continue 'outer;
            }
        }
        folded.push(candidate);
    }
    folded
}

fn is_duplicate(a: &PendingEvent, b: &PendingEvent) -> bool {
    if normalize_name(&a.subject_surface) != normalize_name(&b.subject_surface) {
        return false;
    }
    if a.category != b.category {
        return false;
    }
    let mut a_actors: Vec<String> = a.actors.iter().map(|(s, _)| normalize_name(s)).collect();
    let mut b_actors: Vec<String> = b.actors.iter().map(|(s, _)| normalize_name(s)).collect();
    a_actors.sort();
    b_actors.sort();
    if a_actors != b_actors {
        return false;
    }
    narrative_similarity(&a.narrative, &b.narrative) > 0.8
}

/// Token-overlap (Jaccard) similarity — cheap and deterministic, adequate
/// for catching the "same sentence extracted from two overlapping chunks"
/// case without a second model call.
fn narrative_similarity(a: &str, b: &str) -> f32 {
    use std::collections::HashSet;
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(subject: &str, category: &str, narrative: &str) -> PendingEvent {
        PendingEvent {
            category: category.to_owned(),
            narrative: narrative.to_owned(),
            event_time: None,
            confidence: 0.9,
            subject_surface: subject.to_owned(),
            subject_type: "project".to_owned(),
            actors: vec![],
            evidence_quote: narrative.to_owned(),
            evidence_start: 0,
            evidence_end: narrative.len(),
            chunk_id: None,
        }
    }

    #[test]
    fn near_identical_events_from_overlapping_chunks_fold_into_one() {
        let events = vec![
            pending("Project Orion", "Decision", "the team decided to ship Orion next week"),
            pending("Project Orion", "Decision", "the team decided to ship Orion next week."),
        ];
        let folded = fold_duplicate_events(events);
        assert_eq!(folded.len(), 1);
    }

    #[test]
    fn distinct_events_with_same_subject_are_kept_separate() {
        let events = vec![
            pending("Project Orion", "Decision", "the team decided to ship Orion next week"),
            pending("Project Orion", "QualityRisk", "a regression was found in the Orion build"),
        ];
        let folded = fold_duplicate_events(events);
        assert_eq!(folded.len(), 2);
    }
}

//! Entity Resolver (spec §4.7): two-phase resolution — an embedding
//! pre-filter over same-typed entities followed by an LLM confirmation call
//! per candidate. Grounded in `knowledge_entity.rs`'s
//! `candidate_entities`-style vector prefilter; the confirmation call is
//! grounded in the old `services.rs`'s `perform_analysis` shape.

use common::storage::{
    db::SurrealDbClient,
    types::{
        entity::{normalize_name, Entity, EntityCandidate, EntityType},
        entity_alias::EntityAlias,
        entity_mention::EntityMention,
        entity_uncertain_pair::EntityUncertainPair,
    },
};
use common::error::AppError;
use tracing::warn;

use crate::pipeline::services::PipelineServices;
use crate::types::{ContextClues, ExtractedMention, MergeConfirmation, MergeDecision};
use crate::utils::llm_instructions::{
    build_merge_confirmation_user_prompt, merge_confirmation_schema,
    MERGE_CONFIRMATION_SYSTEM_MESSAGE,
};

/// Outcome of resolving one mention, carrying just enough for the
/// extractor to link event actor/subject references.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub entity_id: String,
}

pub struct EntityResolver<'a> {
    db: &'a SurrealDbClient,
    services: &'a dyn PipelineServices,
    similarity_threshold: f32,
    max_candidates: usize,
}

impl<'a> EntityResolver<'a> {
    pub const fn new(
        db: &'a SurrealDbClient,
        services: &'a dyn PipelineServices,
        similarity_threshold: f32,
        max_candidates: usize,
    ) -> Self {
        Self {
            db,
            services,
            similarity_threshold,
            max_candidates,
        }
    }

    /// Resolves one extracted mention into an entity, writing the
    /// create/merge rows as it goes (spec §4.7 "Writes").
    pub async fn resolve_mention(
        &self,
        mention: &ExtractedMention,
        artifact_uid: &str,
        revision_id: &str,
        source_title: &str,
    ) -> Result<ResolutionOutcome, AppError> {
        let entity_type = EntityType::from_str_loose(&mention.entity_type);
        let context_text = context_string(&mention.canonical_suggestion, &mention.context_clues);

        let embedding = match self.services.embed(&context_text).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, mention = %mention.surface_form, "embedding failed during resolution; creating entity without one");
                let entity_id = self
                    .create_entity(mention, entity_type, None, artifact_uid, revision_id, true)
                    .await?;
                return Ok(ResolutionOutcome { entity_id });
            }
        };

        let candidates = Entity::candidate_entities(
            self.db,
            entity_type,
            &embedding,
            self.max_candidates,
            self.similarity_threshold,
        )
        .await?;

        if candidates.is_empty() {
            let entity_id = self
                .create_entity(
                    mention,
                    entity_type,
                    Some(embedding),
                    artifact_uid,
                    revision_id,
                    false,
                )
                .await?;
            return Ok(ResolutionOutcome { entity_id });
        }

        // Candidates are already ordered similarity DESC, id ASC (spec
        // §4.7 determinism), so the first `uncertain` we see while scanning
        // for a `same` is automatically the best uncertain candidate.
        let mut best_uncertain: Option<&EntityCandidate> = None;
        for candidate in &candidates {
            match self
                .confirm_merge(mention, &context_text, candidate, source_title)
                .await
            {
                Ok(confirmation) if confirmation.decision == MergeDecision::Same => {
                    let entity_id = self
                        .merge_into(mention, candidate, &confirmation, artifact_uid, revision_id)
                        .await?;
                    return Ok(ResolutionOutcome { entity_id });
                }
                Ok(confirmation) if confirmation.decision == MergeDecision::Uncertain => {
                    if best_uncertain.is_none() {
                        best_uncertain = Some(candidate);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, mention = %mention.surface_form, "merge confirmation failed; treating as uncertain");
                    if best_uncertain.is_none() {
                        best_uncertain = Some(candidate);
                    }
                }
            }
        }

        let entity_id = self
            .create_entity(
                mention,
                entity_type,
                Some(embedding),
                artifact_uid,
                revision_id,
                best_uncertain.is_some(),
            )
            .await?;

        if let Some(candidate) = best_uncertain {
            let pair = EntityUncertainPair::new(
                entity_id.clone(),
                candidate.entity.id.clone(),
                candidate.similarity,
                format!(
                    "possible match with \"{}\" ({:.2} context similarity); LLM confirmation was uncertain",
                    candidate.entity.canonical_name, candidate.similarity
                ),
            );
            pair.record(self.db).await?;
        }

        Ok(ResolutionOutcome { entity_id })
    }

    async fn confirm_merge(
        &self,
        mention: &ExtractedMention,
        new_context: &str,
        candidate: &EntityCandidate,
        source_title: &str,
    ) -> Result<MergeConfirmation, AppError> {
        let candidate_context = context_string(
            &candidate.entity.canonical_name,
            &ContextClues {
                role: candidate.entity.role.clone(),
                org: candidate.entity.organization.clone(),
                email: candidate.entity.email.clone(),
            },
        );

        let prompt = build_merge_confirmation_user_prompt(
            &candidate.entity.canonical_name,
            entity_type_label(candidate.entity.entity_type),
            &candidate_context,
            source_title,
            &mention.canonical_suggestion,
            &mention.entity_type,
            new_context,
            source_title,
        );

        let value = self
            .services
            .complete(
                MERGE_CONFIRMATION_SYSTEM_MESSAGE,
                &prompt,
                "merge_confirmation",
                merge_confirmation_schema(),
            )
            .await?;

        serde_json::from_value(value)
            .map_err(|e| AppError::LLMInvalidResponse(format!("invalid merge confirmation: {e}")))
    }

    async fn create_entity(
        &self,
        mention: &ExtractedMention,
        entity_type: EntityType,
        embedding: Option<Vec<f32>>,
        artifact_uid: &str,
        revision_id: &str,
        needs_review: bool,
    ) -> Result<String, AppError> {
        let entity = Entity::new(
            entity_type,
            mention.canonical_suggestion.clone(),
            mention.context_clues.role.clone(),
            mention.context_clues.org.clone(),
            mention.context_clues.email.clone(),
            embedding,
            artifact_uid.to_owned(),
            revision_id.to_owned(),
            needs_review,
        );
        entity.insert(self.db).await?;

        for alias in &mention.aliases_in_doc {
            EntityAlias::add(self.db, &entity.id, alias).await?;
        }

        self.record_mention(&entity.id, mention, artifact_uid, revision_id)
            .await?;

        Ok(entity.id)
    }

    async fn merge_into(
        &self,
        mention: &ExtractedMention,
        candidate: &EntityCandidate,
        confirmation: &MergeConfirmation,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<String, AppError> {
        let entity = &candidate.entity;

        let already_known = normalize_name(&mention.surface_form) == entity.normalized_name
            || EntityAlias::alias_exists(self.db, &entity.id, &mention.surface_form).await?;
        if !already_known {
            EntityAlias::add(self.db, &entity.id, &mention.surface_form).await?;
        }

        if Entity::should_update_canonical_name(&entity.canonical_name, &confirmation.canonical_name)
        {
            Entity::update_canonical_name(self.db, &entity.id, &confirmation.canonical_name).await?;
        }

        self.record_mention(&entity.id, mention, artifact_uid, revision_id)
            .await?;

        Ok(entity.id.clone())
    }

    async fn record_mention(
        &self,
        entity_id: &str,
        mention: &ExtractedMention,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<(), AppError> {
        EntityMention::new(
            entity_id.to_owned(),
            artifact_uid.to_owned(),
            revision_id.to_owned(),
            mention.surface_form.clone(),
            mention.start_char,
            mention.end_char,
        )
        .record(self.db)
        .await
    }
}

fn entity_type_label(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Person => "person",
        EntityType::Org => "org",
        EntityType::Project => "project",
        EntityType::Object => "object",
        EntityType::Place => "place",
        EntityType::Other => "other",
    }
}

fn context_string(name: &str, clues: &ContextClues) -> String {
    format!(
        "{name}, role: {}, org: {}",
        clues.role.as_deref().unwrap_or("unknown"),
        clues.org.as_deref().unwrap_or("unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::services::MockPipelineServices;
    use common::storage::db::SurrealDbClient;
    use uuid::Uuid;

    fn sample_mention(surface_form: &str, canonical: &str) -> ExtractedMention {
        ExtractedMention {
            surface_form: surface_form.to_owned(),
            canonical_suggestion: canonical.to_owned(),
            entity_type: "person".to_owned(),
            context_clues: ContextClues {
                role: Some("Engineer".into()),
                org: Some("Acme".into()),
                email: None,
            },
            aliases_in_doc: vec![],
            confidence: 0.9,
            start_char: Some(0),
            end_char: Some(surface_form.len()),
        }
    }

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn creates_entity_when_no_candidates_exist() {
        let db = test_db().await;
        let mut services = MockPipelineServices::new();
        services
            .expect_embed()
            .returning(|_| Box::pin(async { Ok(vec![1.0, 0.0, 0.0]) }));

        let resolver = EntityResolver::new(&db, &services, 0.85, 5);
        let mention = sample_mention("Alice Chen", "Alice Chen");

        let outcome = resolver
            .resolve_mention(&mention, "art_1", "rev_1", "doc title")
            .await
            .expect("resolve");

        let entity = Entity::get(&db, &outcome.entity_id)
            .await
            .expect("get")
            .expect("entity exists");
        assert_eq!(entity.canonical_name, "Alice Chen");
        assert!(!entity.needs_review);
    }

    #[tokio::test]
    async fn embedding_failure_falls_back_to_needs_review_create() {
        let db = test_db().await;
        let mut services = MockPipelineServices::new();
        services.expect_embed().returning(|_| {
            Box::pin(async { Err(AppError::TransientEmbedding("boom".into())) })
        });

        let resolver = EntityResolver::new(&db, &services, 0.85, 5);
        let mention = sample_mention("Bob", "Bob");

        let outcome = resolver
            .resolve_mention(&mention, "art_1", "rev_1", "doc title")
            .await
            .expect("resolve despite embedding failure");

        let entity = Entity::get(&db, &outcome.entity_id)
            .await
            .expect("get")
            .expect("entity exists");
        assert!(entity.needs_review);
        assert!(entity.context_embedding.is_none());
    }
}

//! Drives `recall` end to end (spec §4.11): embed the query, k-NN search
//! the enabled vector namespaces, RRF-fuse and de-duplicate by artifact,
//! optionally stitch in neighboring chunks and a 1-hop graph expansion.
//! Grounded in the teacher's `retrieval-pipeline/src/pipeline/mod.rs`
//! multi-stage orchestration shape, rebuilt around rank fusion instead of
//! the teacher's linear score blend.

mod config;
mod services;

pub use config::{RetrievalConfig, RetrievalTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultQueryEmbedder, QueryEmbedder};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            artifact_revision::ArtifactRevision,
            entity::Entity,
            entity_alias::EntityAlias,
            entity_mention::EntityMention,
            event_links::{EventActor, EventSubject},
            evidence::Evidence,
            semantic_event::SemanticEvent,
        },
        vector::{VectorFilter, VectorHit, VectorNamespace, VectorStoreGateway},
    },
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::graph_expander::GraphExpander;
use crate::scoring::{self, FusedDocument};

fn default_limit() -> usize {
    5
}
fn default_graph_budget() -> usize {
    10
}
fn default_graph_seed_limit() -> usize {
    5
}
const fn default_include_entities() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecallRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_memory: bool,
    #[serde(default)]
    pub expand_neighbors: bool,
    #[serde(default)]
    pub graph_expand: bool,
    #[serde(default)]
    pub graph_depth: Option<u8>,
    #[serde(default = "default_graph_budget")]
    pub graph_budget: usize,
    #[serde(default = "default_graph_seed_limit")]
    pub graph_seed_limit: usize,
    #[serde(default)]
    pub graph_filters: Option<Vec<String>>,
    #[serde(default = "default_include_entities")]
    pub include_entities: bool,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Artifact,
    Chunk,
    Memory,
    Event,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrimaryResult {
    pub id: String,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    pub content: String,
    pub metadata: common::storage::vector::VectorMetadata,
    pub rrf_score: f32,
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvidenceRef {
    pub quote: String,
    pub artifact_uid: String,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedContextItem {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub id: String,
    pub category: String,
    pub reason: String,
    pub summary: String,
    pub event_time: Option<DateTime<Utc>>,
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    pub entity_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: &'static str,
    pub role: Option<String>,
    pub organization: Option<String>,
    pub aliases: Vec<String>,
    pub mention_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpandOption {
    pub name: &'static str,
    pub description: &'static str,
}

fn expand_options() -> Vec<ExpandOption> {
    vec![
        ExpandOption {
            name: "expand_neighbors",
            description: "Include the chunks immediately before and after each chunk hit.",
        },
        ExpandOption {
            name: "graph_expand",
            description: "Pull in a 1-hop neighborhood of events sharing an actor or subject with the results.",
        },
        ExpandOption {
            name: "include_memory",
            description: "Also search small directly-remembered items alongside document chunks.",
        },
        ExpandOption {
            name: "include_entities",
            description: "Attach the entities referenced by the primary and related results.",
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallResponse {
    pub primary_results: Vec<PrimaryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_context: Option<Vec<RelatedContextItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntitySummary>>,
    pub expand_options: Vec<ExpandOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[allow(clippy::module_name_repetitions)]
pub struct RetrievalService {
    db: Arc<SurrealDbClient>,
    config: RetrievalConfig,
    embedder: Arc<dyn QueryEmbedder>,
}

impl RetrievalService {
    pub const fn new(
        db: Arc<SurrealDbClient>,
        config: RetrievalConfig,
        embedder: Arc<dyn QueryEmbedder>,
    ) -> Self {
        Self {
            db,
            config,
            embedder,
        }
    }

    /// Implements spec §4.11 steps 1-8.
    pub async fn recall(&self, request: &RecallRequest) -> Result<RecallResponse, AppError> {
        let query_vector = self.embedder.embed_query(&request.query).await?;

        let k = (request.limit * 4).max(20);
        let gateway = VectorStoreGateway::new(&self.db);

        let mut namespace_hits: Vec<(VectorNamespace, Vec<VectorHit>)> = Vec::new();
        let chunk_hits = gateway
            .knn(VectorNamespace::Chunks, &query_vector, k, &VectorFilter::default())
            .await?;
        namespace_hits.push((VectorNamespace::Chunks, chunk_hits));

        if request.include_memory {
            let content_hits = gateway
                .knn(VectorNamespace::Content, &query_vector, k, &VectorFilter::default())
                .await?;
            namespace_hits.push((VectorNamespace::Content, content_hits));
        }

        for (_, hits) in &mut namespace_hits {
            hits.retain(|hit| hit.distance <= self.config.tuning.distance_cutoff);
        }

        let fused = scoring::reciprocal_rank_fuse(&namespace_hits, self.config.tuning.rrf_k);

        let mut primary_results = Vec::with_capacity(request.limit.min(fused.len()));
        for doc in fused.into_iter().take(request.limit) {
            let content = if request.expand_neighbors
                && doc.representative_namespace == VectorNamespace::Chunks
            {
                self.with_expanded_neighbors(&gateway, &doc).await?
            } else {
                doc.representative.text.clone()
            };

            primary_results.push(PrimaryResult {
                id: doc.representative.id.clone(),
                result_type: namespace_result_type(doc.representative_namespace),
                content,
                metadata: doc.representative.metadata.clone(),
                rrf_score: doc.rrf_score,
                collections: doc.collections.iter().map(|c| (*c).to_owned()).collect(),
            });
        }

        let mut related_context = None;
        let mut entities = None;
        let mut warning = None;

        if request.graph_expand {
            let seeds = self
                .derive_seed_events(&primary_results, request.graph_seed_limit)
                .await?;

            match GraphExpander::new(&self.db)
                .expand_with_timeout(
                    &seeds,
                    request.graph_budget,
                    request.graph_filters.as_deref(),
                    self.config.tuning.graph_query_timeout_ms,
                )
                .await
            {
                Ok(related) => {
                    let event_ids: Vec<String> = related.iter().map(|r| r.event.id.clone()).collect();
                    let evidence = Evidence::for_events(&self.db, &event_ids).await?;
                    let mut evidence_by_event: HashMap<String, Vec<EvidenceRef>> = HashMap::new();
                    for e in evidence {
                        evidence_by_event.entry(e.event_id.clone()).or_default().push(EvidenceRef {
                            quote: e.quote,
                            artifact_uid: e.artifact_uid,
                            start_char: e.start_char,
                            end_char: e.end_char,
                        });
                    }

                    if request.include_entities {
                        let all_event_ids: Vec<String> =
                            seeds.iter().cloned().chain(event_ids.iter().cloned()).collect();
                        entities = Some(self.collect_entities(&all_event_ids).await?);
                    }

                    related_context = Some(
                        related
                            .into_iter()
                            .map(|r| RelatedContextItem {
                                item_type: "event",
                                id: r.event.id.clone(),
                                category: r.event.category,
                                reason: r.reason,
                                summary: r.event.narrative,
                                event_time: r.event.event_time,
                                evidence: evidence_by_event.remove(&r.event.id).unwrap_or_default(),
                            })
                            .collect(),
                    );
                }
                Err(err) => {
                    warn!(error = %err, "graph expansion unavailable; returning primary results only");
                    warning = Some(format!("graph expansion unavailable: {err}"));
                    related_context = Some(Vec::new());
                }
            }
        }

        Ok(RecallResponse {
            primary_results,
            related_context,
            entities,
            expand_options: expand_options(),
            warning,
        })
    }

    /// Spec §4.11 step 5: fetch the adjacent chunk on either side of a hit
    /// and join with a `[CHUNK BOUNDARY]` marker.
    async fn with_expanded_neighbors(
        &self,
        gateway: &VectorStoreGateway<'_>,
        doc: &FusedDocument,
    ) -> Result<String, AppError> {
        let Some(index) = doc.representative.metadata.chunk_index else {
            return Ok(doc.representative.text.clone());
        };
        let siblings = gateway
            .list_by_revision(
                VectorNamespace::Chunks,
                &doc.representative.metadata.artifact_uid,
                &doc.representative.metadata.revision_id,
            )
            .await?;

        let mut parts = Vec::new();
        for offset in [-1isize, 0, 1] {
            let Some(target) = index.checked_add_signed(offset) else {
                continue;
            };
            if let Some(hit) = siblings.iter().find(|h| h.metadata.chunk_index == Some(target)) {
                parts.push(hit.text.clone());
            }
        }
        Ok(parts.join("\n[CHUNK BOUNDARY]\n"))
    }

    /// Spec §4.11 step 7a/b: each primary result's artifact's latest
    /// revision contributes its events as seeds, capped at
    /// `graph_seed_limit`.
    async fn derive_seed_events(
        &self,
        primary_results: &[PrimaryResult],
        graph_seed_limit: usize,
    ) -> Result<Vec<String>, AppError> {
        let mut seeds: Vec<String> = Vec::new();
        let mut seen_artifacts: HashSet<String> = HashSet::new();

        for result in primary_results {
            if seeds.len() >= graph_seed_limit {
                break;
            }
            if !seen_artifacts.insert(result.metadata.artifact_uid.clone()) {
                continue;
            }
            let Some(revision) = ArtifactRevision::find_latest(&self.db, &result.metadata.artifact_uid).await?
            else {
                continue;
            };
            let events = SemanticEvent::for_revision(&self.db, &revision.artifact_uid, &revision.revision_id).await?;
            for event in events {
                if seeds.len() >= graph_seed_limit {
                    break;
                }
                seeds.push(event.id);
            }
        }
        Ok(seeds)
    }

    /// Spec §4.11 step 7d: entities referenced by any seed or related event,
    /// via their `ACTED_IN`/`ABOUT` links.
    async fn collect_entities(&self, event_ids: &[String]) -> Result<Vec<EntitySummary>, AppError> {
        let mut entity_ids: HashSet<String> = HashSet::new();
        for event_id in event_ids {
            for actor in EventActor::for_event(&self.db, event_id).await? {
                entity_ids.insert(actor.entity_id);
            }
            for subject in EventSubject::for_event(&self.db, event_id).await? {
                entity_ids.insert(subject.entity_id);
            }
        }
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = entity_ids.into_iter().collect();
        let entities = Entity::get_many(&self.db, &ids).await?;

        let mut summaries = Vec::with_capacity(entities.len());
        for entity in entities {
            let aliases = EntityAlias::for_entity(&self.db, &entity.id).await?;
            let mention_count = EntityMention::count_for_entity(&self.db, &entity.id).await?;
            summaries.push(EntitySummary {
                entity_id: entity.id,
                name: entity.canonical_name,
                entity_type: entity_type_label(entity.entity_type),
                role: entity.role,
                organization: entity.organization,
                aliases: aliases.into_iter().map(|a| a.alias).collect(),
                mention_count,
            });
        }
        Ok(summaries)
    }
}

const fn namespace_result_type(ns: VectorNamespace) -> ResultType {
    match ns {
        VectorNamespace::Chunks => ResultType::Chunk,
        VectorNamespace::Content => ResultType::Memory,
    }
}

const fn entity_type_label(entity_type: common::storage::types::entity::EntityType) -> &'static str {
    use common::storage::types::entity::EntityType;
    match entity_type {
        EntityType::Person => "person",
        EntityType::Org => "org",
        EntityType::Project => "project",
        EntityType::Object => "object",
        EntityType::Place => "place",
        EntityType::Other => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::{
        relational::{replace_events, RevisionEvents},
        types::{artifact_revision::ArtifactType, entity::EntityType, event_links::ActorRole},
    };

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    fn embedder_stub() -> Arc<dyn QueryEmbedder> {
        use crate::pipeline::services::MockQueryEmbedder;
        let mut mock = MockQueryEmbedder::new();
        mock.expect_embed_query()
            .returning(|_| Box::pin(async { Ok(vec![1.0, 0.0, 0.0]) }));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn recall_returns_primary_results_ranked_by_rrf() {
        let db = Arc::new(test_db().await);
        let gateway = VectorStoreGateway::new(&db);
        gateway
            .upsert(
                VectorNamespace::Chunks,
                "chunk_close",
                vec![1.0, 0.0, 0.0],
                common::storage::vector::VectorMetadata {
                    artifact_uid: "art_close".into(),
                    revision_id: "rev_close".into(),
                    chunk_index: Some(0),
                    ..Default::default()
                },
                "closely matching text",
            )
            .await
            .expect("upsert close");
        gateway
            .upsert(
                VectorNamespace::Chunks,
                "chunk_far",
                vec![0.0, 1.0, 0.0],
                common::storage::vector::VectorMetadata {
                    artifact_uid: "art_far".into(),
                    revision_id: "rev_far".into(),
                    chunk_index: Some(0),
                    ..Default::default()
                },
                "unrelated text",
            )
            .await
            .expect("upsert far");

        let service = RetrievalService::new(
            Arc::clone(&db),
            RetrievalConfig::from(&common::utils::config::AppConfig::for_tests("ns", "db")),
            embedder_stub(),
        );

        let response = service
            .recall(&RecallRequest {
                query: "closely matching".into(),
                limit: 5,
                include_memory: false,
                expand_neighbors: false,
                graph_expand: false,
                graph_depth: None,
                graph_budget: 10,
                graph_seed_limit: 5,
                graph_filters: None,
                include_entities: true,
                filters: None,
            })
            .await
            .expect("recall");

        assert!(!response.primary_results.is_empty());
        assert_eq!(response.primary_results[0].id, "chunk_close");
        assert!(response.related_context.is_none());
        assert!(response.entities.is_none());
        assert!(!response.expand_options.is_empty());
    }

    #[tokio::test]
    async fn recall_with_graph_expand_surfaces_related_events_and_entities() {
        let db = Arc::new(test_db().await);
        let gateway = VectorStoreGateway::new(&db);
        gateway
            .upsert(
                VectorNamespace::Chunks,
                "chunk_seed",
                vec![1.0, 0.0, 0.0],
                common::storage::vector::VectorMetadata {
                    artifact_uid: "art_seed".into(),
                    revision_id: "rev_seed".into(),
                    chunk_index: Some(0),
                    ..Default::default()
                },
                "Alice made a decision",
            )
            .await
            .expect("upsert");

        let revision = ArtifactRevision::new(
            "art_seed".into(),
            "rev_seed".into(),
            ArtifactType::Chat,
            None,
            None,
            "Alice made a decision".into(),
            5,
            false,
            0,
            None,
        );
        revision.insert_as_latest(&db).await.expect("insert revision");

        let entity = Entity::new(
            EntityType::Person,
            "Alice Chen".into(),
            None,
            None,
            None,
            None,
            "art_seed".into(),
            "rev_seed".into(),
            false,
        );
        entity.insert(&db).await.expect("insert entity");

        let seed_event = SemanticEvent::new(
            "art_seed".into(),
            "rev_seed".into(),
            "Decision".into(),
            "Alice decided to ship".into(),
            None,
            0.9,
            "run_a".into(),
        );
        let related_event = SemanticEvent::new(
            "art_other".into(),
            "rev_other".into(),
            "Commitment".into(),
            "Alice committed to the deadline".into(),
            None,
            0.8,
            "run_b".into(),
        );

        replace_events(
            &db,
            "art_seed",
            "rev_seed",
            RevisionEvents {
                events: vec![seed_event.clone()],
                evidence: vec![],
                actors: vec![EventActor::new(seed_event.id.clone(), entity.id.clone(), ActorRole::Owner)],
                subjects: vec![],
            },
        )
        .await
        .expect("seed events");
        replace_events(
            &db,
            "art_other",
            "rev_other",
            RevisionEvents {
                events: vec![related_event.clone()],
                evidence: vec![],
                actors: vec![EventActor::new(related_event.id.clone(), entity.id.clone(), ActorRole::Owner)],
                subjects: vec![],
            },
        )
        .await
        .expect("related events");

        let service = RetrievalService::new(
            Arc::clone(&db),
            RetrievalConfig::from(&common::utils::config::AppConfig::for_tests("ns", "db")),
            embedder_stub(),
        );

        let response = service
            .recall(&RecallRequest {
                query: "Alice decision".into(),
                limit: 5,
                include_memory: false,
                expand_neighbors: false,
                graph_expand: true,
                graph_depth: Some(1),
                graph_budget: 10,
                graph_seed_limit: 5,
                graph_filters: None,
                include_entities: true,
                filters: None,
            })
            .await
            .expect("recall");

        let related = response.related_context.expect("related context present");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].reason, "same_actor:Alice Chen");

        let entities = response.entities.expect("entities present");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Alice Chen");
    }

    #[tokio::test]
    async fn graph_expand_false_omits_related_context_and_entities() {
        let db = Arc::new(test_db().await);
        let service = RetrievalService::new(
            Arc::clone(&db),
            RetrievalConfig::from(&common::utils::config::AppConfig::for_tests("ns", "db")),
            embedder_stub(),
        );

        let response = service
            .recall(&RecallRequest {
                query: "anything".into(),
                limit: 5,
                include_memory: false,
                expand_neighbors: false,
                graph_expand: false,
                graph_depth: None,
                graph_budget: 10,
                graph_seed_limit: 5,
                graph_filters: None,
                include_entities: true,
                filters: None,
            })
            .await
            .expect("recall");

        assert!(response.related_context.is_none());
        assert!(response.entities.is_none());
    }
}

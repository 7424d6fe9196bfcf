//! Graph Expander (spec §4.10): 1-hop traversal from seed events to related
//! events sharing an actor or subject entity, bounded by a fan-out budget
//! and a hard timeout so a slow graph backend never blocks `recall`'s
//! primary results (spec §5 "graph expansion is allowed to fail"). Grounded
//! in the teacher's `retrieval-pipeline/src/graph.rs` relationship
//! traversal, generalized from a single `find_entities_by_relationship`
//! call into the seed/budget/category-bounded walk the spec describes.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            entity::Entity,
            event_links::{EventActor, EventSubject},
            semantic_event::SemanticEvent,
        },
    },
};

#[derive(Debug, Clone)]
pub struct RelatedEvent {
    pub event: SemanticEvent,
    pub reason: String,
}

pub struct GraphExpander<'a> {
    db: &'a SurrealDbClient,
}

impl<'a> GraphExpander<'a> {
    pub const fn new(db: &'a SurrealDbClient) -> Self {
        Self { db }
    }

    /// Runs `expand` under the configured hard timeout; on timeout the
    /// caller degrades to an empty `related_context` plus a warning rather
    /// than failing `recall` (spec §4.10 "Implementation constraint").
    pub async fn expand_with_timeout(
        &self,
        seeds: &[String],
        budget: usize,
        categories: Option<&[String]>,
        timeout_ms: u64,
    ) -> Result<Vec<RelatedEvent>, AppError> {
        if budget == 0 || seeds.is_empty() {
            return Ok(Vec::new());
        }
        tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.expand(seeds, budget, categories),
        )
        .await
        .map_err(|_| AppError::GraphUnavailable(format!("graph expansion exceeded {timeout_ms}ms")))?
    }

    async fn expand(
        &self,
        seeds: &[String],
        budget: usize,
        categories: Option<&[String]>,
    ) -> Result<Vec<RelatedEvent>, AppError> {
        let seed_set: HashSet<&str> = seeds.iter().map(String::as_str).collect();
        let mut reasons: Vec<(String, String)> = Vec::new();
        let mut seen_candidates: HashSet<String> = HashSet::new();
        let mut name_cache: HashMap<String, String> = HashMap::new();

        for seed in seeds {
            let actors = EventActor::for_event(self.db, seed).await?;
            let subjects = EventSubject::for_event(self.db, seed).await?;

            let mut neighbor_ids: Vec<String> = actors
                .iter()
                .map(|a| a.entity_id.clone())
                .chain(subjects.iter().map(|s| s.entity_id.clone()))
                .collect();
            neighbor_ids.sort();
            neighbor_ids.dedup();

            for entity_id in neighbor_ids {
                let name = match name_cache.get(&entity_id) {
                    Some(cached) => cached.clone(),
                    None => {
                        let resolved = Entity::get(self.db, &entity_id)
                            .await?
                            .map_or_else(|| entity_id.clone(), |e| e.canonical_name);
                        name_cache.insert(entity_id.clone(), resolved.clone());
                        resolved
                    }
                };

                for row in EventActor::for_entity(self.db, &entity_id).await? {
                    if seed_set.contains(row.event_id.as_str()) {
                        continue;
                    }
                    if seen_candidates.insert(row.event_id.clone()) {
                        reasons.push((row.event_id, format!("same_actor:{name}")));
                    }
                }
                for row in EventSubject::for_entity(self.db, &entity_id).await? {
                    if seed_set.contains(row.event_id.as_str()) {
                        continue;
                    }
                    if seen_candidates.insert(row.event_id.clone()) {
                        reasons.push((row.event_id, format!("same_subject:{name}")));
                    }
                }
            }
        }

        if reasons.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_ids: Vec<String> = reasons.iter().map(|(id, _)| id.clone()).collect();
        let reason_map: HashMap<String, String> = reasons.into_iter().collect();
        let events = SemanticEvent::get_many(self.db, &candidate_ids).await?;

        let mut filtered: Vec<SemanticEvent> = events
            .into_iter()
            .filter(|event| {
                categories.is_none_or(|cats| {
                    cats.is_empty() || cats.iter().any(|c| c.eq_ignore_ascii_case(&event.category))
                })
            })
            .collect();

        filtered.sort_by(cmp_by_recency_then_confidence_then_id);
        filtered.truncate(budget);

        Ok(filtered
            .into_iter()
            .map(|event| {
                let reason = reason_map.get(&event.id).cloned().unwrap_or_default();
                RelatedEvent { event, reason }
            })
            .collect())
    }
}

/// `(event_time DESC NULLS LAST, confidence DESC, event_id ASC)` (spec
/// §4.10 ordering rule).
fn cmp_by_recency_then_confidence_then_id(a: &SemanticEvent, b: &SemanticEvent) -> Ordering {
    let time_order = match (a.event_time, b.event_time) {
        (Some(at), Some(bt)) => bt.cmp(&at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    time_order
        .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::{
        relational::{replace_events, RevisionEvents},
        types::{entity::EntityType, event_links::ActorRole, evidence::Evidence},
    };

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn expands_to_event_sharing_an_actor() {
        let db = test_db().await;

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
            "Alice decided X".into(),
            None,
            0.9,
            "run_a".into(),
        );
        let related_event = SemanticEvent::new(
            "art_other".into(),
            "rev_other".into(),
            "Commitment".into(),
            "Alice committed to Y".into(),
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
                actors: vec![EventActor::new(
                    seed_event.id.clone(),
                    entity.id.clone(),
                    ActorRole::Owner,
                )],
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
                actors: vec![EventActor::new(
                    related_event.id.clone(),
                    entity.id.clone(),
                    ActorRole::Owner,
                )],
                subjects: vec![],
            },
        )
        .await
        .expect("related events");

        let expander = GraphExpander::new(&db);
        let related = expander
            .expand_with_timeout(&[seed_event.id.clone()], 10, None, 500)
            .await
            .expect("expand");

        assert_eq!(related.len(), 1);
        assert_eq!(related[0].event.id, related_event.id);
        assert_eq!(related[0].reason, "same_actor:Alice Chen");
    }

    #[tokio::test]
    async fn budget_zero_returns_empty_without_querying() {
        let db = test_db().await;
        let expander = GraphExpander::new(&db);
        let related = expander
            .expand_with_timeout(&["evt_1".into()], 0, None, 500)
            .await
            .expect("expand");
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn category_filter_excludes_non_matching_events() {
        let db = test_db().await;
        let entity = Entity::new(
            EntityType::Person,
            "Bob".into(),
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
            "Bob decided X".into(),
            None,
            0.9,
            "run_a".into(),
        );
        let related_event = SemanticEvent::new(
            "art_other".into(),
            "rev_other".into(),
            "Feedback".into(),
            "Bob gave feedback".into(),
            None,
            0.7,
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
        .expect("seed");

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
        .expect("related");

        let expander = GraphExpander::new(&db);
        let related = expander
            .expand_with_timeout(
                &[seed_event.id.clone()],
                10,
                Some(&["Decision".to_owned()]),
                500,
            )
            .await
            .expect("expand");
        assert!(related.is_empty());

        let _ = Evidence::for_event(&db, &seed_event.id).await.expect("evidence lookup still works");
    }
}

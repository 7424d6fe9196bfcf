//! Graph Materializer (spec §4.9/§4.10): the graph is a derived index, never
//! a source of truth. This module rebuilds `ACTED_IN`, `ABOUT`, and
//! `POSSIBLY_SAME` edges from the relational rows that actually own the
//! data (`event_actor`/`event_subject`/`entity_uncertain_pair`), the same
//! way `artifact_revision.rs`'s `delete_cascade` clears derived rows before
//! a fresh write. MERGE semantics: an edge is identified by its endpoints,
//! so re-running materialization for the same revision is a no-op.

use common::error::AppError;
use common::storage::{
    db::SurrealDbClient,
    relational::{fetch_events_for_revision, fetch_uncertain_pairs},
    types::{
        event_links::{EventActor, EventSubject},
        semantic_event::SemanticEvent,
    },
};

const ACTED_IN: &str = "acted_in";
const ABOUT: &str = "about";
const POSSIBLY_SAME: &str = "possibly_same";

#[derive(Debug, Default)]
pub struct GraphUpsertCounts {
    pub acted_in: u64,
    pub about: u64,
    pub possibly_same: u64,
}

pub struct GraphMaterializer<'a> {
    db: &'a SurrealDbClient,
}

impl<'a> GraphMaterializer<'a> {
    pub const fn new(db: &'a SurrealDbClient) -> Self {
        Self { db }
    }

    /// Rebuilds the `ACTED_IN`/`ABOUT` edges for every event of one revision
    /// from the relational `event_actor`/`event_subject` rows (spec §4.9).
    pub async fn materialize_revision(
        &self,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<GraphUpsertCounts, AppError> {
        let events = fetch_events_for_revision(self.db, artifact_uid, revision_id).await?;
        let mut counts = GraphUpsertCounts::default();

        for event in &events {
            let actors = EventActor::for_event(self.db, &event.id).await?;
            let subjects = EventSubject::for_event(self.db, &event.id).await?;

            self.clear_event_edges(event).await?;

            for actor in &actors {
                self.upsert_edge(ACTED_IN, "entity", &actor.entity_id, "semantic_event", &event.id)
                    .await?;
                counts.acted_in += 1;
            }
            for subject in &subjects {
                self.upsert_edge(ABOUT, "semantic_event", &event.id, "entity", &subject.entity_id)
                    .await?;
                counts.about += 1;
            }
        }

        Ok(counts)
    }

    /// Mirrors unresolved `entity_uncertain_pair` rows into `POSSIBLY_SAME`
    /// edges and removes edges for pairs that have since been resolved
    /// (spec §3.2 "a later extraction confirming `same` removes the
    /// relation"). See DESIGN.md's Open Question decision on why the pair
    /// table stays the source of truth rather than the edge.
    pub async fn materialize_uncertain_pairs(&self) -> Result<GraphUpsertCounts, AppError> {
        self.db
            .client
            .query(format!("DELETE {POSSIBLY_SAME}"))
            .await?
            .check()?;

        let pairs = fetch_uncertain_pairs(self.db).await?;
        let mut counts = GraphUpsertCounts::default();
        for pair in &pairs {
            self.upsert_possibly_same_edge(&pair.entity_a, &pair.entity_b, pair.confidence, &pair.reason)
                .await?;
            counts.possibly_same += 1;
        }
        Ok(counts)
    }

    /// `POSSIBLY_SAME` carries `{confidence, reason}` (spec §4.9), unlike
    /// `ACTED_IN`/`ABOUT` which are plain structural edges.
    async fn upsert_possibly_same_edge(
        &self,
        entity_a: &str,
        entity_b: &str,
        confidence: f32,
        reason: &str,
    ) -> Result<(), AppError> {
        self.db
            .client
            .query(format!(
                "RELATE type::thing('entity', $entity_a)->{POSSIBLY_SAME}->type::thing('entity', $entity_b)
                 SET confidence = $confidence, reason = $reason"
            ))
            .bind(("entity_a", entity_a.to_owned()))
            .bind(("entity_b", entity_b.to_owned()))
            .bind(("confidence", confidence))
            .bind(("reason", reason.to_owned()))
            .await?
            .check()?;
        Ok(())
    }

    async fn clear_event_edges(&self, event: &SemanticEvent) -> Result<(), AppError> {
        self.db
            .client
            .query(format!(
                "DELETE {ACTED_IN} WHERE out = type::thing('semantic_event', $event_id);
                 DELETE {ABOUT} WHERE in = type::thing('semantic_event', $event_id);"
            ))
            .bind(("event_id", event.id.clone()))
            .await?
            .check()?;
        Ok(())
    }

    async fn upsert_edge(
        &self,
        edge_table: &str,
        from_table: &str,
        from_id: &str,
        to_table: &str,
        to_id: &str,
    ) -> Result<(), AppError> {
        self.db
            .client
            .query(format!(
                "RELATE type::thing('{from_table}', $from_id)->{edge_table}->type::thing('{to_table}', $to_id)"
            ))
            .bind(("from_id", from_id.to_owned()))
            .bind(("to_id", to_id.to_owned()))
            .await?
            .check()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::{
        relational::{replace_events, RevisionEvents},
        types::event_links::ActorRole,
    };

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn materialize_revision_is_idempotent() {
        let db = test_db().await;
        let event = SemanticEvent::new(
            "art_1".into(),
            "rev_1".into(),
            "Decision".into(),
            "shipped it".into(),
            None,
            0.9,
            "run_a".into(),
        );
        replace_events(
            &db,
            "art_1",
            "rev_1",
            RevisionEvents {
                events: vec![event.clone()],
                evidence: vec![],
                actors: vec![EventActor::new(event.id.clone(), "ent_1".into(), ActorRole::Owner)],
                subjects: vec![EventSubject::new(event.id.clone(), "ent_2".into())],
            },
        )
        .await
        .expect("seed events");

        let materializer = GraphMaterializer::new(&db);
        let first = materializer
            .materialize_revision("art_1", "rev_1")
            .await
            .expect("first materialize");
        let second = materializer
            .materialize_revision("art_1", "rev_1")
            .await
            .expect("second materialize");

        assert_eq!(first.acted_in, 1);
        assert_eq!(first.about, 1);
        assert_eq!(second.acted_in, 1);
        assert_eq!(second.about, 1);
    }
}

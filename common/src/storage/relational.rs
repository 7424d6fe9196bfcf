#![allow(clippy::missing_docs_in_private_items)]
//! Relational Store Gateway (spec §3.2/§4.9): the relational tables are the
//! source of truth; the graph is a derived index rebuilt from them. The one
//! operation that matters here is `replace_events` — events for a given
//! `(artifact_uid, revision_id)` are never patched in place, they are
//! swapped out atomically, grounded in `artifact_revision.rs`'s
//! `insert_as_latest`/`delete_cascade` transaction idiom.

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            entity_uncertain_pair::EntityUncertainPair,
            evidence::Evidence,
            event_links::{EventActor, EventSubject},
            semantic_event::SemanticEvent,
        },
    },
};

/// Everything the Event Extractor produces for one artifact revision,
/// bundled so `replace_events` can swap it in as a single transaction.
pub struct RevisionEvents {
    pub events: Vec<SemanticEvent>,
    pub evidence: Vec<Evidence>,
    pub actors: Vec<EventActor>,
    pub subjects: Vec<EventSubject>,
}

/// Atomically replaces every event (and its evidence/actor/subject rows)
/// for `(artifact_uid, revision_id)` with a new set (spec §4.9 "replace
/// wholesale, never patch"). Committing zero events is valid — it clears
/// out a prior extraction run for a revision that turned out to carry no
/// signal.
pub async fn replace_events(
    db: &SurrealDbClient,
    artifact_uid: &str,
    revision_id: &str,
    bundle: RevisionEvents,
) -> Result<(), AppError> {
    db.client
        .query(
            "BEGIN TRANSACTION;
             DELETE evidence WHERE artifact_uid = $uid AND revision_id = $rev;
             LET $old_events = (SELECT VALUE id FROM semantic_event WHERE artifact_uid = $uid AND revision_id = $rev);
             DELETE event_actor WHERE event_id IN $old_events;
             DELETE event_subject WHERE event_id IN $old_events;
             DELETE semantic_event WHERE artifact_uid = $uid AND revision_id = $rev;
             IF array::len($events) > 0 { INSERT INTO semantic_event $events };
             IF array::len($evidence) > 0 { INSERT INTO evidence $evidence };
             IF array::len($actors) > 0 { INSERT INTO event_actor $actors };
             IF array::len($subjects) > 0 { INSERT INTO event_subject $subjects };
             COMMIT TRANSACTION;",
        )
        .bind(("uid", artifact_uid.to_owned()))
        .bind(("rev", revision_id.to_owned()))
        .bind(("events", bundle.events))
        .bind(("evidence", bundle.evidence))
        .bind(("actors", bundle.actors))
        .bind(("subjects", bundle.subjects))
        .await?
        .check()?;
    Ok(())
}

/// Every event committed for a revision, used to rebuild the Event nodes
/// of the graph index (spec §4.10 Graph Materializer).
pub async fn fetch_events_for_revision(
    db: &SurrealDbClient,
    artifact_uid: &str,
    revision_id: &str,
) -> Result<Vec<SemanticEvent>, AppError> {
    SemanticEvent::for_revision(db, artifact_uid, revision_id).await
}

/// Unresolved `POSSIBLY_SAME` candidates, used by both the Graph
/// Materializer (to mirror the edge) and `status` (to report the backlog).
pub async fn fetch_uncertain_pairs(
    db: &SurrealDbClient,
) -> Result<Vec<EntityUncertainPair>, AppError> {
    EntityUncertainPair::fetch_uncertain_pairs(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::event_links::ActorRole;

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn replace_events_swaps_out_prior_run_atomically() {
        let db = test_db().await;
        let event = SemanticEvent::new(
            "art_1".into(),
            "rev_1".into(),
            "Decision".into(),
            "first run".into(),
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
                actors: vec![EventActor::new(
                    event.id.clone(),
                    "ent_1".into(),
                    ActorRole::Owner,
                )],
                subjects: vec![],
            },
        )
        .await
        .expect("first replace");

        let fetched = fetch_events_for_revision(&db, "art_1", "rev_1")
            .await
            .expect("fetch");
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].narrative, "first run");

        let second_event = SemanticEvent::new(
            "art_1".into(),
            "rev_1".into(),
            "Commitment".into(),
            "second run".into(),
            None,
            0.8,
            "run_b".into(),
        );
        replace_events(
            &db,
            "art_1",
            "rev_1",
            RevisionEvents {
                events: vec![second_event],
                evidence: vec![],
                actors: vec![],
                subjects: vec![],
            },
        )
        .await
        .expect("second replace");

        let fetched = fetch_events_for_revision(&db, "art_1", "rev_1")
            .await
            .expect("fetch after replace");
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].narrative, "second run");

        let actors = EventActor::for_entity(&db, "ent_1").await.expect("actors");
        assert!(actors.is_empty(), "stale actor row must be gone after replace");
    }

    #[tokio::test]
    async fn replace_events_with_empty_bundle_clears_revision() {
        let db = test_db().await;
        let event = SemanticEvent::new(
            "art_2".into(),
            "rev_2".into(),
            "Decision".into(),
            "will be cleared".into(),
            None,
            0.9,
            "run_a".into(),
        );
        replace_events(
            &db,
            "art_2",
            "rev_2",
            RevisionEvents {
                events: vec![event],
                evidence: vec![],
                actors: vec![],
                subjects: vec![],
            },
        )
        .await
        .expect("seed");

        replace_events(
            &db,
            "art_2",
            "rev_2",
            RevisionEvents {
                events: vec![],
                evidence: vec![],
                actors: vec![],
                subjects: vec![],
            },
        )
        .await
        .expect("clear");

        let fetched = fetch_events_for_revision(&db, "art_2", "rev_2")
            .await
            .expect("fetch");
        assert!(fetched.is_empty());
    }
}

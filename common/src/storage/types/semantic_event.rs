#![allow(clippy::missing_docs_in_private_items, clippy::too_many_arguments)]
//! `SemanticEvent` (spec §3.1/§4.8): a structured extraction from one
//! artifact revision. Events are never mutated — they are always replaced
//! per `(artifact_uid, revision_id)` by `replace_events`.

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Known categories from the permissive taxonomy (spec §4.8); additional
/// strings are accepted and passed through as `Other`.
pub const KNOWN_CATEGORIES: &[&str] = &[
    "Decision",
    "Commitment",
    "Execution",
    "Collaboration",
    "QualityRisk",
    "Feedback",
    "Change",
    "Stakeholder",
];

stored_object!(SemanticEvent, "semantic_event", {
    artifact_uid: String,
    revision_id: String,
    category: String,
    narrative: String,
    event_time: Option<DateTime<Utc>>,
    confidence: f32,
    extraction_run_id: String
});

impl SemanticEvent {
    pub fn new(
        artifact_uid: String,
        revision_id: String,
        category: String,
        narrative: String,
        event_time: Option<DateTime<Utc>>,
        confidence: f32,
        extraction_run_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            artifact_uid,
            revision_id,
            category,
            narrative,
            event_time,
            confidence: confidence.clamp(0.0, 1.0),
            extraction_run_id,
        }
    }

    pub async fn get(db: &SurrealDbClient, id: &str) -> Result<Option<Self>, AppError> {
        Ok(db.get_item::<Self>(id).await?)
    }

    pub async fn get_many(db: &SurrealDbClient, ids: &[String]) -> Result<Vec<Self>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let things: Vec<surrealdb::sql::Thing> = ids
            .iter()
            .map(|id| surrealdb::sql::Thing::from(("semantic_event", id.as_str())))
            .collect();
        let mut response = db
            .client
            .query("SELECT * FROM semantic_event WHERE id IN $ids")
            .bind(("ids", things))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn for_revision(
        db: &SurrealDbClient,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM semantic_event WHERE artifact_uid = $uid AND revision_id = $rev")
            .bind(("uid", artifact_uid.to_owned()))
            .bind(("rev", revision_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    /// The artifact a given event belongs to; used by `forget(evt_*)` to
    /// populate `source_artifact_id` in its refusal response (spec §4.12).
    pub async fn source_artifact_uid(
        db: &SurrealDbClient,
        event_id: &str,
    ) -> Result<Option<String>, AppError> {
        let event: Option<Self> = db.get_item::<Self>(event_id).await?;
        Ok(event.map(|e| e.artifact_uid))
    }
}

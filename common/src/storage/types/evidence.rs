#![allow(clippy::missing_docs_in_private_items, clippy::too_many_arguments)]
//! `Evidence` (spec §3.1): a verbatim quote span anchoring an event to its
//! source text. `chunk_id`, when present, must name a chunk stored in the
//! vector store's `chunks` namespace for the same revision (spec §3.2).

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Evidence, "evidence", {
    event_id: String,
    artifact_uid: String,
    revision_id: String,
    chunk_id: Option<String>,
    start_char: usize,
    end_char: usize,
    quote: String
});

impl Evidence {
    pub fn new(
        event_id: String,
        artifact_uid: String,
        revision_id: String,
        chunk_id: Option<String>,
        start_char: usize,
        end_char: usize,
        quote: String,
    ) -> Result<Self, AppError> {
        if end_char <= start_char {
            return Err(AppError::InvalidInput(
                "evidence span must have end_char > start_char".into(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            event_id,
            artifact_uid,
            revision_id,
            chunk_id,
            start_char,
            end_char,
            quote,
        })
    }

    pub async fn for_event(db: &SurrealDbClient, event_id: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM evidence WHERE event_id = $event_id")
            .bind(("event_id", event_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn for_events(db: &SurrealDbClient, event_ids: &[String]) -> Result<Vec<Self>, AppError> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut response = db
            .client
            .query("SELECT * FROM evidence WHERE event_id IN $ids")
            .bind(("ids", event_ids.to_vec()))
            .await?;
        Ok(response.take(0)?)
    }
}

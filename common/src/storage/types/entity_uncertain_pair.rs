#![allow(clippy::missing_docs_in_private_items)]
//! Relational home for `POSSIBLY_SAME` relations (spec §3.2/§4.7/§4.9):
//! the source of truth for an uncertain-merge decision, later mirrored into
//! a `POSSIBLY_SAME` graph edge by the Graph Materializer. See DESIGN.md's
//! Open Question decisions for why this needs its own table rather than
//! living only as a graph edge.

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(EntityUncertainPair, "entity_uncertain_pair", {
    entity_a: String,
    entity_b: String,
    confidence: f32,
    reason: String,
    resolved: bool
});

impl EntityUncertainPair {
    pub fn new(entity_a: String, entity_b: String, confidence: f32, reason: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            entity_a,
            entity_b,
            confidence,
            reason,
            resolved: false,
        }
    }

    pub async fn record(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.store_item(self.clone()).await?;
        Ok(())
    }

    /// Fetches pairs that still need a human/automated review pass.
    pub async fn fetch_uncertain_pairs(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM entity_uncertain_pair WHERE resolved = false")
            .await?;
        Ok(response.take(0)?)
    }

    /// If a subsequent extraction confirms the pair as the same entity, the
    /// pair is merged and the relation removed (spec §3.2).
    pub async fn resolve_as_merged(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('entity_uncertain_pair', $id) SET resolved = true, updated_at = $now",
            )
            .bind(("id", id.to_owned()))
            .bind(("now", Utc::now()))
            .await?
            .check()?;
        Ok(())
    }
}

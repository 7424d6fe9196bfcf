#![allow(clippy::missing_docs_in_private_items, clippy::too_many_arguments)]
//! `Entity` (spec §3.1/§4.7): a canonical real-world actor/subject, resolved
//! via the two-phase Entity Resolver and deduplicated across documents.

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Org,
    Project,
    Object,
    Place,
    Other,
}

impl EntityType {
    pub fn from_str_loose(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "person" => Self::Person,
            "org" | "organization" | "organisation" => Self::Org,
            "project" => Self::Project,
            "object" => Self::Object,
            "place" => Self::Place,
            _ => Self::Other,
        }
    }
}

/// Lowercased/whitespace-collapsed form used for alias and candidate
/// matching (spec §3.1 `normalized_name`).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

stored_object!(Entity, "entity", {
    entity_type: EntityType,
    canonical_name: String,
    normalized_name: String,
    role: Option<String>,
    organization: Option<String>,
    email: Option<String>,
    context_embedding: Option<Vec<f32>>,
    first_seen_artifact_uid: String,
    first_seen_revision_id: String,
    needs_review: bool
});

#[derive(Debug, Deserialize)]
pub struct EntityCandidate {
    pub entity: Entity,
    pub similarity: f32,
}

impl Entity {
    pub fn new(
        entity_type: EntityType,
        canonical_name: String,
        role: Option<String>,
        organization: Option<String>,
        email: Option<String>,
        context_embedding: Option<Vec<f32>>,
        first_seen_artifact_uid: String,
        first_seen_revision_id: String,
        needs_review: bool,
    ) -> Self {
        let now = Utc::now();
        let normalized_name = normalize_name(&canonical_name);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            entity_type,
            canonical_name,
            normalized_name,
            role,
            organization,
            email,
            context_embedding,
            first_seen_artifact_uid,
            first_seen_revision_id,
            needs_review,
        }
    }

    pub async fn insert(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.store_item(self.clone()).await?;
        Ok(())
    }

    /// Phase A candidate generation (spec §4.7): up to `limit` entities of
    /// the same type with `cosine_distance < 1 - threshold`, ordered by
    /// similarity descending, tie-broken by `entity_id` ascending for
    /// determinism.
    pub async fn candidate_entities(
        db: &SurrealDbClient,
        entity_type: EntityType,
        embedding: &[f32],
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<EntityCandidate>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT *, vector::similarity::cosine(context_embedding, $embedding) AS similarity
                 FROM entity
                 WHERE entity_type = $entity_type
                   AND context_embedding != NONE
                   AND vector::similarity::cosine(context_embedding, $embedding) > $threshold
                 ORDER BY similarity DESC, id ASC
                 LIMIT $limit",
            )
            .bind(("entity_type", entity_type))
            .bind(("embedding", embedding.to_vec()))
            .bind(("threshold", similarity_threshold))
            .bind(("limit", limit))
            .await?;

        #[derive(Deserialize)]
        struct Row {
            #[serde(flatten)]
            entity: Entity,
            similarity: f32,
        }
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| EntityCandidate {
                entity: r.entity,
                similarity: r.similarity,
            })
            .collect())
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
            .map(|id| surrealdb::sql::Thing::from(("entity", id.as_str())))
            .collect();
        let mut response = db
            .client
            .query("SELECT * FROM entity WHERE id IN $ids")
            .bind(("ids", things))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn set_needs_review(
        db: &SurrealDbClient,
        id: &str,
        needs_review: bool,
    ) -> Result<(), AppError> {
        db.client
            .query("UPDATE type::thing('entity', $id) SET needs_review = $flag, updated_at = $now")
            .bind(("id", id.to_owned()))
            .bind(("flag", needs_review))
            .bind(("now", Utc::now()))
            .await?
            .check()?;
        Ok(())
    }

    /// Fills a missing embedding without otherwise mutating the entity
    /// (spec §3.2 append-only mutation list); used by the fallback-repair
    /// sweep when resolution created an entity without one.
    pub async fn set_context_embedding(
        db: &SurrealDbClient,
        id: &str,
        embedding: Vec<f32>,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('entity', $id) SET context_embedding = $embedding, updated_at = $now",
            )
            .bind(("id", id.to_owned()))
            .bind(("embedding", embedding))
            .bind(("now", Utc::now()))
            .await?
            .check()?;
        Ok(())
    }

    /// Updates the canonical name only when the new suggestion is strictly
    /// more complete (spec §4.7 MERGE writes): longer, and contains the
    /// existing name as a substring.
    pub fn should_update_canonical_name(existing: &str, suggestion: &str) -> bool {
        suggestion.len() > existing.len()
            && suggestion.to_lowercase().contains(&existing.to_lowercase())
    }

    pub async fn update_canonical_name(
        db: &SurrealDbClient,
        id: &str,
        canonical_name: &str,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('entity', $id) SET canonical_name = $name,
                    normalized_name = $normalized, updated_at = $now",
            )
            .bind(("id", id.to_owned()))
            .bind(("name", canonical_name.to_owned()))
            .bind(("normalized", normalize_name(canonical_name)))
            .bind(("now", Utc::now()))
            .await?
            .check()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize_name("  Alice   Chen "), "alice chen");
    }

    #[test]
    fn canonical_name_upgrades_only_for_strictly_more_complete_names() {
        assert!(Entity::should_update_canonical_name("A. Chen", "Alice Chen"));
        assert!(!Entity::should_update_canonical_name("Alice Chen", "A. Chen"));
        assert!(!Entity::should_update_canonical_name("Alice Chen", "Bob Jones"));
    }

    #[test]
    fn entity_type_parses_common_aliases() {
        assert_eq!(EntityType::from_str_loose("Organization"), EntityType::Org);
        assert_eq!(EntityType::from_str_loose("unknown"), EntityType::Other);
    }
}

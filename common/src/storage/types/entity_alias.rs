#![allow(clippy::missing_docs_in_private_items)]
//! `EntityAlias` (spec §3.1): an alternate surface form recognized as
//! referring to the same entity. Keyed `(entity_id, normalized_alias)`.

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::entity::normalize_name;

stored_object!(EntityAlias, "entity_alias", {
    entity_id: String,
    alias: String,
    normalized_alias: String
});

impl EntityAlias {
    pub fn new(entity_id: String, alias: String) -> Self {
        let now = Utc::now();
        let normalized_alias = normalize_name(&alias);
        Self {
            id: format!("{entity_id}::{normalized_alias}"),
            created_at: now,
            updated_at: now,
            entity_id,
            alias,
            normalized_alias,
        }
    }

    /// Idempotent insert: re-adding an existing alias is a no-op (the `id`
    /// is the `(entity_id, normalized_alias)` composite key).
    pub async fn add(db: &SurrealDbClient, entity_id: &str, alias: &str) -> Result<(), AppError> {
        let record = Self::new(entity_id.to_owned(), alias.to_owned());
        db.client
            .query("UPSERT type::thing('entity_alias', $id) CONTENT $record")
            .bind(("id", record.id.clone()))
            .bind(("record", record))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn for_entity(db: &SurrealDbClient, entity_id: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM entity_alias WHERE entity_id = $entity_id")
            .bind(("entity_id", entity_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn alias_exists(
        db: &SurrealDbClient,
        entity_id: &str,
        alias: &str,
    ) -> Result<bool, AppError> {
        let normalized = normalize_name(alias);
        let mut response = db
            .client
            .query(
                "SELECT count() AS c FROM entity_alias WHERE entity_id = $entity_id AND normalized_alias = $normalized GROUP ALL",
            )
            .bind(("entity_id", entity_id.to_owned()))
            .bind(("normalized", normalized))
            .await?;
        #[derive(Deserialize)]
        struct Count {
            c: i64,
        }
        let rows: Vec<Count> = response.take(0)?;
        Ok(rows.first().is_some_and(|r| r.c > 0))
    }
}

#![allow(clippy::missing_docs_in_private_items, clippy::too_many_arguments)]
//! `EntityMention` (spec §3.1): one occurrence of an entity's surface form
//! in a specific revision.

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(EntityMention, "entity_mention", {
    entity_id: String,
    artifact_uid: String,
    revision_id: String,
    surface_form: String,
    start_char: Option<usize>,
    end_char: Option<usize>
});

impl EntityMention {
    pub fn new(
        entity_id: String,
        artifact_uid: String,
        revision_id: String,
        surface_form: String,
        start_char: Option<usize>,
        end_char: Option<usize>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            entity_id,
            artifact_uid,
            revision_id,
            surface_form,
            start_char,
            end_char,
        }
    }

    pub async fn record(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.store_item(self.clone()).await?;
        Ok(())
    }

    pub async fn count_for_entity(db: &SurrealDbClient, entity_id: &str) -> Result<u64, AppError> {
        #[derive(Deserialize)]
        struct Count {
            c: i64,
        }
        let mut response = db
            .client
            .query("SELECT count() AS c FROM entity_mention WHERE entity_id = $entity_id GROUP ALL")
            .bind(("entity_id", entity_id.to_owned()))
            .await?;
        let rows: Vec<Count> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.c.max(0) as u64))
    }

    pub async fn for_revision(
        db: &SurrealDbClient,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM entity_mention WHERE artifact_uid = $uid AND revision_id = $rev",
            )
            .bind(("uid", artifact_uid.to_owned()))
            .bind(("rev", revision_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    /// `forget` removes mentions for an artifact; entities are never
    /// directly deleted (spec §3.3) and orphans become candidates for a
    /// future sweeper rather than being garbage-collected here.
    pub async fn delete_for_artifact(
        db: &SurrealDbClient,
        artifact_uid: &str,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE entity_mention WHERE artifact_uid = $uid")
            .bind(("uid", artifact_uid.to_owned()))
            .await?
            .check()?;
        Ok(())
    }
}

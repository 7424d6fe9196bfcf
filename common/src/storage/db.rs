use crate::error::AppError;

use super::types::StoredObject;
use futures::Stream;
use std::{ops::Deref, sync::Arc};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};

/// Dimension of `Entity.context_embedding` and the `chunks`/`content` vector
/// namespaces (spec §3.1 `Vector<3072>`). The HNSW indexes below are defined
/// against this fixed dimension; swapping embedding backends to a different
/// dimension requires a reindex, which is out of scope for this store.
pub const EMBEDDING_DIMENSION: u32 = 3_072;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

impl SurrealDbClient {
    /// Connects to a SurrealDB instance and selects the given namespace/database.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        Self::build_indexes(self).await?;
        Ok(())
    }

    /// Defines the indexes the core pipeline depends on: HNSW vector search
    /// over entity context embeddings and the `content`/`chunks` vector
    /// namespaces, plus lookup indexes for the job queue's claim protocol
    /// and the uniqueness invariants in spec §3.2.
    pub async fn build_indexes(&self) -> Result<(), Error> {
        self.client
            .query(format!(
                "DEFINE INDEX idx_entity_embedding ON entity FIELDS context_embedding HNSW DIMENSION {EMBEDDING_DIMENSION} DIST COSINE TYPE F32 EFC 100 M 8"
            ))
            .await?;
        self.client
            .query(format!(
                "DEFINE INDEX idx_vector_content_embedding ON vector_content FIELDS embedding HNSW DIMENSION {EMBEDDING_DIMENSION} DIST COSINE TYPE F32 EFC 100 M 8"
            ))
            .await?;
        self.client
            .query(format!(
                "DEFINE INDEX idx_vector_chunks_embedding ON vector_chunks FIELDS embedding HNSW DIMENSION {EMBEDDING_DIMENSION} DIST COSINE TYPE F32 EFC 100 M 8"
            ))
            .await?;

        self.client
            .query("DEFINE INDEX idx_job_claim ON job FIELDS job_type, status, next_run_at")
            .await?;
        self.client
            .query("DEFINE INDEX idx_job_key ON job FIELDS artifact_uid, revision_id, job_type UNIQUE")
            .await?;

        self.client
            .query("DEFINE INDEX idx_revision_artifact ON artifact_revision FIELDS artifact_uid, is_latest")
            .await?;
        self.client
            .query("DEFINE INDEX idx_entity_alias ON entity_alias FIELDS entity_id, normalized_alias")
            .await?;
        self.client
            .query("DEFINE INDEX idx_mention_artifact ON entity_mention FIELDS artifact_uid")
            .await?;
        self.client
            .query("DEFINE INDEX idx_event_revision ON semantic_event FIELDS artifact_uid, revision_id")
            .await?;

        Ok(())
    }

    pub async fn rebuild_indexes(&self) -> Result<(), Error> {
        self.client
            .query("REBUILD INDEX IF EXISTS idx_entity_embedding ON entity")
            .await?;
        self.client
            .query("REBUILD INDEX IF EXISTS idx_vector_content_embedding ON vector_content")
            .await?;
        self.client
            .query("REBUILD INDEX IF EXISTS idx_vector_chunks_embedding ON vector_chunks")
            .await?;
        Ok(())
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    /// Stores an object under `(table_name, id)`, requires `StoredObject`.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    /// Live-query a table for updates; used by `status` to report graph
    /// materialization lag in a future iteration (not yet wired up).
    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_initialized()
            .await
            .expect("Failed to initialize schema");

        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("Failed to fetch all");
        assert!(all.contains(&dummy));

        let deleted = db
            .delete_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_build_indexes() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.build_indexes().await.expect("Failed to build indexes");
    }
}

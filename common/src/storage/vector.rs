#![allow(clippy::missing_docs_in_private_items)]
//! Vector Store Gateway (spec §4.4): the external vector store, treated as
//! an index over two namespaces — `content` (one vector per small artifact
//! or synopsis) and `chunks` (one vector per chunk). Implemented as a thin
//! SurrealDB-backed gateway, grounded in `text_chunk.rs`'s HNSW
//! `vector_search` pattern but generalized to a namespace parameter instead
//! of a single hard-coded table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use surrealdb::sql::Thing;

use crate::{error::AppError, storage::db::SurrealDbClient};

fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdForm {
        Raw(String),
        Thing(Thing),
    }
    match IdForm::deserialize(deserializer)? {
        IdForm::Raw(s) => Ok(s),
        IdForm::Thing(thing) => Ok(thing.id.to_raw()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorNamespace {
    Content,
    Chunks,
}

impl VectorNamespace {
    const fn table(self) -> &'static str {
        match self {
            Self::Content => "vector_content",
            Self::Chunks => "vector_chunks",
        }
    }
}

/// Metadata carried on every vector document (spec §6.3): enough to filter
/// at retrieval time without a join back to the relational store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub artifact_type: Option<String>,
    pub source_system: Option<String>,
    pub document_date: Option<DateTime<Utc>>,
    pub artifact_uid: String,
    pub revision_id: String,
    pub chunk_index: Option<usize>,
}

/// Optional equality filters applied server-side during `knn` (spec §4.4
/// `where`). `None` fields are not filtered on.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub artifact_uid: Option<String>,
    pub revision_id: Option<String>,
    pub source_system: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorDocument {
    id: String,
    embedding: Vec<f32>,
    text: String,
    metadata: VectorMetadata,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    /// Cosine distance: `1.0 - cosine_similarity`, in `[0, 2]`.
    pub distance: f32,
    pub text: String,
    pub metadata: VectorMetadata,
}

pub struct VectorStoreGateway<'a> {
    db: &'a SurrealDbClient,
}

impl<'a> VectorStoreGateway<'a> {
    pub const fn new(db: &'a SurrealDbClient) -> Self {
        Self { db }
    }

    pub async fn upsert(
        &self,
        ns: VectorNamespace,
        id: &str,
        vector: Vec<f32>,
        metadata: VectorMetadata,
        text: &str,
    ) -> Result<(), AppError> {
        let doc = VectorDocument {
            id: id.to_owned(),
            embedding: vector,
            text: text.to_owned(),
            metadata,
            created_at: Utc::now(),
        };
        self.db
            .client
            .query(format!(
                "UPSERT type::thing('{}', $id) CONTENT $doc",
                ns.table()
            ))
            .bind(("id", id.to_owned()))
            .bind(("doc", doc))
            .await?
            .check()?;
        Ok(())
    }

    /// k-NN search (spec §4.4): returns up to `k` items ordered by
    /// ascending distance, with the optional equality `where` filter
    /// applied inside the HNSW scan.
    pub async fn knn(
        &self,
        ns: VectorNamespace,
        vector: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>, AppError> {
        let mut clauses = vec![format!("embedding <|{k},40|> $vector")];
        if filter.artifact_uid.is_some() {
            clauses.push("metadata.artifact_uid = $artifact_uid".to_owned());
        }
        if filter.revision_id.is_some() {
            clauses.push("metadata.revision_id = $revision_id".to_owned());
        }
        if filter.source_system.is_some() {
            clauses.push("metadata.source_system = $source_system".to_owned());
        }

        let sql = format!(
            "SELECT id, text, metadata,
                    vector::distance::knn() AS distance
             FROM {table}
             WHERE {where_clause}
             ORDER BY distance ASC
             LIMIT {k}",
            table = ns.table(),
            where_clause = clauses.join(" AND "),
        );

        let mut query = self.db.client.query(sql).bind(("vector", vector.to_vec()));
        if let Some(uid) = &filter.artifact_uid {
            query = query.bind(("artifact_uid", uid.clone()));
        }
        if let Some(rev) = &filter.revision_id {
            query = query.bind(("revision_id", rev.clone()));
        }
        if let Some(system) = &filter.source_system {
            query = query.bind(("source_system", system.clone()));
        }

        #[derive(Deserialize)]
        struct Row {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
            text: String,
            metadata: VectorMetadata,
            distance: f32,
        }

        let mut response = query.await?;
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| VectorHit {
                id: r.id,
                distance: r.distance,
                text: r.text,
                metadata: r.metadata,
            })
            .collect())
    }

    /// Fetches every document stored for `(artifact_uid, revision_id)` in
    /// `ns`, ordered by `chunk_index` ascending. Used by the Event
    /// Extractor to read back a revision's already-chunked-and-embedded
    /// content instead of doing a k-NN search for it.
    pub async fn list_by_revision(
        &self,
        ns: VectorNamespace,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<Vec<VectorHit>, AppError> {
        let sql = format!(
            "SELECT id, text, metadata, 0.0 AS distance
             FROM {table}
             WHERE metadata.artifact_uid = $uid AND metadata.revision_id = $rev
             ORDER BY metadata.chunk_index ASC",
            table = ns.table(),
        );

        #[derive(Deserialize)]
        struct Row {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
            text: String,
            metadata: VectorMetadata,
            distance: f32,
        }

        let mut response = self
            .db
            .client
            .query(sql)
            .bind(("uid", artifact_uid.to_owned()))
            .bind(("rev", revision_id.to_owned()))
            .await?;
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| VectorHit {
                id: r.id,
                distance: r.distance,
                text: r.text,
                metadata: r.metadata,
            })
            .collect())
    }

    pub async fn delete(&self, ns: VectorNamespace, ids: &[String]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.db
            .client
            .query(format!(
                "DELETE {} WHERE id IN $ids OR string::split(<string> id, ':')[1] INSIDE $ids",
                ns.table()
            ))
            .bind(("ids", ids.to_vec()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn delete_by_artifact(
        &self,
        ns: VectorNamespace,
        artifact_uid: &str,
    ) -> Result<u64, AppError> {
        let mut response = self
            .db
            .client
            .query(format!(
                "DELETE {} WHERE metadata.artifact_uid = $uid RETURN BEFORE",
                ns.table()
            ))
            .bind(("uid", artifact_uid.to_owned()))
            .await?
            .check()?;
        let deleted: Vec<VectorDocument> = response.take(0)?;
        Ok(deleted.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3(x: f32, y: f32, z: f32) -> Vec<f32> {
        vec![x, y, z]
    }

    #[tokio::test]
    async fn upsert_then_knn_finds_closest_match() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        let gateway = VectorStoreGateway::new(&db);

        gateway
            .upsert(
                VectorNamespace::Chunks,
                "chunk_a",
                vec3(1.0, 0.0, 0.0),
                VectorMetadata {
                    artifact_uid: "art_1".into(),
                    revision_id: "rev_1".into(),
                    ..Default::default()
                },
                "alpha chunk",
            )
            .await
            .expect("upsert a");
        gateway
            .upsert(
                VectorNamespace::Chunks,
                "chunk_b",
                vec3(0.0, 1.0, 0.0),
                VectorMetadata {
                    artifact_uid: "art_2".into(),
                    revision_id: "rev_2".into(),
                    ..Default::default()
                },
                "beta chunk",
            )
            .await
            .expect("upsert b");

        let hits = gateway
            .knn(
                VectorNamespace::Chunks,
                &vec3(0.9, 0.1, 0.0),
                5,
                &VectorFilter::default(),
            )
            .await
            .expect("knn");

        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "chunk_a");
    }

    #[tokio::test]
    async fn list_by_revision_is_ordered_by_chunk_index() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        let gateway = VectorStoreGateway::new(&db);

        for (idx, label) in [(2, "third"), (0, "first"), (1, "second")] {
            gateway
                .upsert(
                    VectorNamespace::Chunks,
                    &format!("chunk_{idx}"),
                    vec3(1.0, 0.0, 0.0),
                    VectorMetadata {
                        artifact_uid: "art_rev".into(),
                        revision_id: "rev_a".into(),
                        chunk_index: Some(idx),
                        ..Default::default()
                    },
                    label,
                )
                .await
                .expect("upsert");
        }

        let hits = gateway
            .list_by_revision(VectorNamespace::Chunks, "art_rev", "rev_a")
            .await
            .expect("list_by_revision");

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "first");
        assert_eq!(hits[1].text, "second");
        assert_eq!(hits[2].text, "third");
    }

    #[tokio::test]
    async fn delete_by_artifact_removes_matching_documents() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        let gateway = VectorStoreGateway::new(&db);

        gateway
            .upsert(
                VectorNamespace::Content,
                "mem_1",
                vec3(1.0, 0.0, 0.0),
                VectorMetadata {
                    artifact_uid: "art_x".into(),
                    revision_id: "rev_x".into(),
                    ..Default::default()
                },
                "doc",
            )
            .await
            .expect("upsert");

        let removed = gateway
            .delete_by_artifact(VectorNamespace::Content, "art_x")
            .await
            .expect("delete");
        assert_eq!(removed, 1);
    }
}

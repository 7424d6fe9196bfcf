#![allow(clippy::missing_docs_in_private_items)]
//! `ArtifactRevision` (spec §3.1): a specific content hash of an ingested
//! artifact. Exactly one revision per `artifact_uid` carries `is_latest`.

use sha2::{Digest, Sha256};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArtifactType {
    Email,
    Doc,
    Chat,
    Transcript,
    Note,
}

impl From<Option<String>> for ArtifactType {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(str::to_lowercase).as_deref() {
            Some("email") => Self::Email,
            Some("chat") => Self::Chat,
            Some("transcript") => Self::Transcript,
            Some("note") => Self::Note,
            _ => Self::Doc,
        }
    }
}

impl ArtifactType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Doc => "doc",
            Self::Chat => "chat",
            Self::Transcript => "transcript",
            Self::Note => "note",
        }
    }
}

stored_object!(ArtifactRevision, "artifact_revision", {
    artifact_uid: String,
    revision_id: String,
    artifact_id: String,
    artifact_type: ArtifactType,
    source_system: Option<String>,
    source_id: Option<String>,
    content_hash: String,
    content: String,
    token_count: usize,
    is_chunked: bool,
    chunk_count: usize,
    is_latest: bool,
    metadata: Option<serde_json::Value>,
    ingested_at: DateTime<Utc>
});

/// `artifact_uid := sha256(source_system ":" source_id)` when a source id is
/// supplied, else a fresh UUID (spec §4.12 `remember`).
pub fn derive_artifact_uid(source_system: Option<&str>, source_id: Option<&str>) -> String {
    match (source_system, source_id) {
        (Some(system), Some(id)) if !id.is_empty() => {
            let mut hasher = Sha256::new();
            hasher.update(system.as_bytes());
            hasher.update(b":");
            hasher.update(id.as_bytes());
            format!("{:x}", hasher.finalize())
        }
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

/// `revision_id := sha256(content)`.
pub fn derive_revision_id(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The client-facing `art_*` id for an `artifact_uid` (spec §4.12's
/// `remember` response and `forget`'s `art_*` prefix). Exposed so the
/// tool layer can compute a revision's chunk ids before the
/// `ArtifactRevision` row itself exists.
pub fn short_artifact_id(artifact_uid: &str) -> String {
    format!("art_{}", &artifact_uid[..artifact_uid.len().min(12)])
}

impl ArtifactRevision {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        artifact_uid: String,
        revision_id: String,
        artifact_type: ArtifactType,
        source_system: Option<String>,
        source_id: Option<String>,
        content: String,
        token_count: usize,
        is_chunked: bool,
        chunk_count: usize,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        let artifact_id = short_artifact_id(&artifact_uid);
        Self {
            id: format!("{artifact_uid}::{revision_id}"),
            created_at: now,
            updated_at: now,
            artifact_uid,
            revision_id: revision_id.clone(),
            artifact_id,
            artifact_type,
            source_system,
            source_id,
            content_hash: revision_id,
            content,
            token_count,
            is_chunked,
            chunk_count,
            is_latest: true,
            metadata,
            ingested_at: now,
        }
    }

    pub async fn find_latest(
        db: &SurrealDbClient,
        artifact_uid: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM artifact_revision WHERE artifact_uid = $uid AND is_latest = true LIMIT 1")
            .bind(("uid", artifact_uid.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Resolves the short, client-facing `artifact_id` (e.g. `art_abc123…`)
    /// back to its `is_latest` revision. Used by `forget`/`status` which
    /// accept the short id rather than the raw `artifact_uid`.
    pub async fn find_latest_by_artifact_id(
        db: &SurrealDbClient,
        artifact_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM artifact_revision WHERE artifact_id = $id AND is_latest = true LIMIT 1")
            .bind(("id", artifact_id.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_by_revision(
        db: &SurrealDbClient,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM artifact_revision WHERE artifact_uid = $uid AND revision_id = $rev LIMIT 1")
            .bind(("uid", artifact_uid.to_owned()))
            .bind(("rev", revision_id.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Inserts a new revision as `is_latest` and flips every other revision
    /// of the same artifact to `is_latest = false`, in one transaction
    /// (spec §3.2/§3.3/§5 — the flip and the insert are atomic together).
    pub async fn insert_as_latest(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query(
                "BEGIN TRANSACTION;
                 UPDATE artifact_revision SET is_latest = false, updated_at = $now
                   WHERE artifact_uid = $uid AND is_latest = true;
                 CREATE type::thing('artifact_revision', $id) CONTENT $revision;
                 COMMIT TRANSACTION;",
            )
            .bind(("uid", self.artifact_uid.clone()))
            .bind(("now", Utc::now()))
            .bind(("id", self.id.clone()))
            .bind(("revision", self.clone()))
            .await?
            .check()?;
        Ok(())
    }

    /// Cascading delete for `forget(art_*)`/`forget(uid_*)`: removes every
    /// revision plus the relational rows derived from them. Returns
    /// per-table counts for the tool response's `cascade` field.
    /// `entities` counts distinct entities referenced by the removed
    /// mentions, not entity rows deleted — entities themselves are never
    /// removed by `forget` (spec §3.3 "entities are never directly deleted
    /// by forget... they become orphan nodes").
    pub async fn delete_cascade(
        db: &SurrealDbClient,
        artifact_uid: &str,
    ) -> Result<CascadeCounts, AppError> {
        let mut response = db
            .client
            .query(
                "BEGIN TRANSACTION;
                 LET $events = (SELECT VALUE id FROM semantic_event WHERE artifact_uid = $uid);
                 LET $event_count = array::len($events);
                 DELETE evidence WHERE artifact_uid = $uid;
                 DELETE event_actor WHERE event_id IN $events;
                 DELETE event_subject WHERE event_id IN $events;
                 DELETE semantic_event WHERE artifact_uid = $uid;
                 LET $entity_ids = array::distinct(SELECT VALUE entity_id FROM entity_mention WHERE artifact_uid = $uid);
                 LET $entity_count = array::len($entity_ids);
                 DELETE entity_mention WHERE artifact_uid = $uid;
                 DELETE job WHERE artifact_uid = $uid;
                 LET $revisions = (SELECT VALUE id FROM artifact_revision WHERE artifact_uid = $uid);
                 LET $chunk_count = math::sum(SELECT VALUE chunk_count FROM artifact_revision WHERE artifact_uid = $uid);
                 DELETE artifact_revision WHERE artifact_uid = $uid;
                 RETURN { events: $event_count, entities: $entity_count, chunks: $chunk_count, revisions: array::len($revisions) };
                 COMMIT TRANSACTION;",
            )
            .bind(("uid", artifact_uid.to_owned()))
            .await?
            .check()?;

        #[derive(Deserialize, Default)]
        struct CascadeRaw {
            #[serde(default)]
            events: i64,
            #[serde(default)]
            entities: i64,
            #[serde(default)]
            chunks: i64,
            #[serde(default)]
            revisions: i64,
        }
        let result: Option<CascadeRaw> = response.take(0)?;
        let result = result.unwrap_or_default();

        Ok(CascadeCounts {
            chunks: result.chunks.max(0) as u64,
            events: result.events.max(0) as u64,
            entities: result.entities.max(0) as u64,
            revisions: result.revisions.max(0) as u64,
        })
    }
}

#[derive(Debug, Default, Serialize)]
pub struct CascadeCounts {
    pub chunks: u64,
    pub events: u64,
    pub entities: u64,
    pub revisions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_uid_is_deterministic_for_same_source() {
        let a = derive_artifact_uid(Some("slack"), Some("C123"));
        let b = derive_artifact_uid(Some("slack"), Some("C123"));
        assert_eq!(a, b);
        let c = derive_artifact_uid(Some("slack"), Some("C999"));
        assert_ne!(a, c);
    }

    #[test]
    fn missing_source_id_yields_fresh_uuid_each_time() {
        let a = derive_artifact_uid(None, None);
        let b = derive_artifact_uid(None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn revision_id_is_content_hash() {
        assert_eq!(derive_revision_id("hello"), derive_revision_id("hello"));
        assert_ne!(derive_revision_id("hello"), derive_revision_id("world"));
    }
}

#![allow(clippy::missing_docs_in_private_items)]
//! The Job Queue (spec §4.6): durable, atomically-claimed units of
//! asynchronous work keyed by `(artifact_uid, revision_id, job_type)`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Default lease: how long a claimed job may stay `Processing` before the
/// reaper considers its worker dead and returns it to `Pending`.
pub const DEFAULT_LEASE_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobType {
    Extract,
    GraphUpsert,
}

impl JobType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::GraphUpsert => "graph_upsert",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

stored_object!(Job, "job", {
    job_type: JobType,
    artifact_uid: String,
    revision_id: String,
    status: JobStatus,
    attempts: u32,
    max_attempts: u32,
    next_run_at: DateTime<Utc>,
    locked_by: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    last_error: Option<String>
});

impl Job {
    pub fn new(
        job_type: JobType,
        artifact_uid: String,
        revision_id: String,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            job_type,
            artifact_uid,
            revision_id,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            next_run_at: now,
            locked_by: None,
            locked_at: None,
            last_error: None,
        }
    }

    /// Enqueues a job for `(artifact_uid, revision_id, job_type)` unless one
    /// already exists (the uniqueness invariant in spec §3.2). A pre-existing
    /// job is a `JobConflict`, which is a silent no-op for the caller per
    /// spec §7 — idempotent enqueue.
    pub async fn enqueue(
        db: &SurrealDbClient,
        job_type: JobType,
        artifact_uid: &str,
        revision_id: &str,
        max_attempts: u32,
    ) -> Result<Self, AppError> {
        let existing = Self::find_existing(db, job_type, artifact_uid, revision_id).await?;
        if let Some(job) = existing {
            return Ok(job);
        }

        let job = Self::new(
            job_type,
            artifact_uid.to_string(),
            revision_id.to_string(),
            max_attempts,
        );
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    /// Used by `status(reextract=true)` (spec §4.12): unlike `enqueue`,
    /// which treats an existing job as a no-op `JobConflict`, a reextract
    /// request wants a fresh run even if the prior job already reached a
    /// terminal state. Since the uniqueness invariant (spec §3.2) allows at
    /// most one `(artifact_uid, revision_id, job_type)` row, this resets
    /// that row back to `Pending` rather than inserting a second one.
    pub async fn enqueue_or_reset(
        db: &SurrealDbClient,
        job_type: JobType,
        artifact_uid: &str,
        revision_id: &str,
        max_attempts: u32,
    ) -> Result<Self, AppError> {
        let existing = Self::find_existing(db, job_type, artifact_uid, revision_id).await?;
        let Some(job) = existing else {
            return Self::enqueue(db, job_type, artifact_uid, revision_id, max_attempts).await;
        };

        if matches!(job.status, JobStatus::Pending | JobStatus::Processing) {
            return Ok(job);
        }

        let now = Utc::now();
        db.client
            .query(
                "UPDATE type::thing('job', $id) SET status = 'Pending',
                    attempts = 0, next_run_at = $now, locked_by = NONE,
                    locked_at = NONE, last_error = NONE, updated_at = $now",
            )
            .bind(("id", job.id.clone()))
            .bind(("now", now))
            .await?
            .check()?;

        Self::find_existing(db, job_type, artifact_uid, revision_id)
            .await?
            .ok_or_else(|| AppError::InternalError("job disappeared after reset".to_owned()))
    }

    pub async fn find_existing(
        db: &SurrealDbClient,
        job_type: JobType,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM job WHERE job_type = $job_type
                   AND artifact_uid = $artifact_uid
                   AND revision_id = $revision_id
                 LIMIT 1",
            )
            .bind(("job_type", job_type))
            .bind(("artifact_uid", artifact_uid.to_owned()))
            .bind(("revision_id", revision_id.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Claim protocol (spec §4.6). A single conditional `UPDATE` statement is
    /// SurrealDB's atomicity boundary in place of Postgres' `SELECT … FOR
    /// UPDATE SKIP LOCKED`: the inner `SELECT … LIMIT 1` picks exactly one
    /// candidate row, and the `UPDATE` only ever lands on that row, so two
    /// concurrent callers can never observe and transition the same job.
    pub async fn claim_next(
        db: &SurrealDbClient,
        job_type: JobType,
        worker_id: &str,
        lease: chrono::Duration,
    ) -> Result<Option<Self>, AppError> {
        let now = Utc::now();
        let mut response = db
            .client
            .query(
                "UPDATE (
                    SELECT id FROM job
                    WHERE job_type = $job_type
                      AND status = 'Pending'
                      AND next_run_at <= $now
                    ORDER BY next_run_at ASC
                    LIMIT 1
                 )
                 SET status = 'Processing',
                     attempts += 1,
                     locked_by = $worker_id,
                     locked_at = $now,
                     updated_at = $now
                 RETURN AFTER;",
            )
            .bind(("job_type", job_type))
            .bind(("now", now))
            .bind(("worker_id", worker_id.to_owned()))
            .await?;

        let claimed: Vec<Self> = response.take(0)?;
        let _ = lease;
        Ok(claimed.into_iter().next())
    }

    pub async fn mark_done(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('job', $id) SET status = 'Done', updated_at = $now, last_error = NONE",
            )
            .bind(("id", self.id.clone()))
            .bind(("now", Utc::now()))
            .await?
            .check()?;
        Ok(())
    }

    /// On failure: retry with backoff (`next_run_at := now + min(60s *
    /// 2^(attempts-1), 1h)`), or transition to `Failed` once `attempts >=
    /// max_attempts` (never retried again, per spec §4.6).
    pub async fn mark_failed(
        &self,
        db: &SurrealDbClient,
        error: &str,
        backoff_base_secs: u64,
        backoff_cap_secs: u64,
    ) -> Result<JobStatus, AppError> {
        let now = Utc::now();
        if self.attempts >= self.max_attempts {
            db.client
                .query(
                    "UPDATE type::thing('job', $id) SET status = 'Failed', last_error = $err, updated_at = $now",
                )
                .bind(("id", self.id.clone()))
                .bind(("err", error.to_owned()))
                .bind(("now", now))
                .await?
                .check()?;
            return Ok(JobStatus::Failed);
        }

        let delay_secs = backoff_delay_secs(self.attempts, backoff_base_secs, backoff_cap_secs);
        let next_run_at = now + chrono::Duration::seconds(delay_secs as i64);

        db.client
            .query(
                "UPDATE type::thing('job', $id) SET status = 'Pending',
                    next_run_at = $next_run_at, last_error = $err,
                    locked_by = NONE, locked_at = NONE, updated_at = $now",
            )
            .bind(("id", self.id.clone()))
            .bind(("next_run_at", next_run_at))
            .bind(("err", error.to_owned()))
            .bind(("now", now))
            .await?
            .check()?;
        Ok(JobStatus::Pending)
    }

    /// The reaper (spec §5): `Processing` rows whose lease has expired are
    /// returned to `Pending` with a backoff, as though the holder had failed.
    pub async fn reap_expired_leases(
        db: &SurrealDbClient,
        lease_secs: i64,
        backoff_base_secs: u64,
    ) -> Result<u64, AppError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(lease_secs);
        let next_run_at = Utc::now() + chrono::Duration::seconds(backoff_base_secs as i64);
        let mut response = db
            .client
            .query(
                "UPDATE job SET status = 'Pending', next_run_at = $next_run_at,
                    locked_by = NONE, locked_at = NONE,
                    last_error = 'reclaimed after lease expiry', updated_at = $now
                 WHERE status = 'Processing' AND locked_at < $cutoff
                 RETURN AFTER;",
            )
            .bind(("cutoff", cutoff))
            .bind(("next_run_at", next_run_at))
            .bind(("now", Utc::now()))
            .await?;
        let reaped: Vec<Self> = response.take(0)?;
        Ok(reaped.len() as u64)
    }

    pub async fn count_by_status(db: &SurrealDbClient) -> Result<Vec<(JobStatus, i64)>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            status: JobStatus,
            count: i64,
        }
        let mut response = db
            .client
            .query("SELECT status, count() AS count FROM job GROUP BY status")
            .await?;
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows.into_iter().map(|r| (r.status, r.count)).collect())
    }

    pub async fn latest_for_revision(
        db: &SurrealDbClient,
        job_type: JobType,
        artifact_uid: &str,
        revision_id: &str,
    ) -> Result<Option<Self>, AppError> {
        Self::find_existing(db, job_type, artifact_uid, revision_id).await
    }
}

/// `next_run_at := now + min(60s * 2^(attempts-1), 1h)`.
pub fn backoff_delay_secs(attempts: u32, base_secs: u64, cap_secs: u64) -> u64 {
    let exponent = attempts.saturating_sub(1).min(20);
    let delay = base_secs.saturating_mul(2_u64.saturating_pow(exponent));
    delay.min(cap_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay_secs(1, 60, 3_600), 60);
        assert_eq!(backoff_delay_secs(2, 60, 3_600), 120);
        assert_eq!(backoff_delay_secs(3, 60, 3_600), 240);
        assert_eq!(backoff_delay_secs(10, 60, 3_600), 3_600);
    }

    #[tokio::test]
    async fn claim_is_exclusive_between_two_callers() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.build_indexes().await.expect("indexes");

        Job::enqueue(&db, JobType::Extract, "art_1", "rev_1", 5)
            .await
            .expect("enqueue");

        let a = Job::claim_next(&db, JobType::Extract, "worker-a", chrono::Duration::seconds(300))
            .await
            .expect("claim a");
        let b = Job::claim_next(&db, JobType::Extract, "worker-b", chrono::Duration::seconds(300))
            .await
            .expect("claim b");

        assert!(a.is_some());
        assert!(b.is_none());
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_per_revision_and_type() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.build_indexes().await.expect("indexes");

        let first = Job::enqueue(&db, JobType::Extract, "art_1", "rev_1", 5)
            .await
            .expect("enqueue");
        let second = Job::enqueue(&db, JobType::Extract, "art_1", "rev_1", 5)
            .await
            .expect("enqueue");

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn enqueue_or_reset_revives_a_done_job_for_reextraction() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.build_indexes().await.expect("indexes");

        let job = Job::enqueue(&db, JobType::Extract, "art_1", "rev_1", 5)
            .await
            .expect("enqueue");
        job.mark_done(&db).await.expect("mark done");

        let revived = Job::enqueue_or_reset(&db, JobType::Extract, "art_1", "rev_1", 5)
            .await
            .expect("enqueue_or_reset");

        assert_eq!(revived.id, job.id);
        assert_eq!(revived.status, JobStatus::Pending);
        assert_eq!(revived.attempts, 0);
    }

    #[tokio::test]
    async fn enqueue_or_reset_leaves_a_pending_job_untouched() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.build_indexes().await.expect("indexes");

        let job = Job::enqueue(&db, JobType::Extract, "art_1", "rev_1", 5)
            .await
            .expect("enqueue");

        let result = Job::enqueue_or_reset(&db, JobType::Extract, "art_1", "rev_1", 5)
            .await
            .expect("enqueue_or_reset");

        assert_eq!(result.id, job.id);
        assert_eq!(result.status, JobStatus::Pending);
    }
}

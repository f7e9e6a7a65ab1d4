//! SQLite-backed store for single-node deployments.
//!
//! Records are stored as JSON payloads with a few indexed columns broken
//! out; the submission-version revision is also a real column so the
//! conditional update can be expressed as a guarded `UPDATE`.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use vellum_core::events::{ActivityEntry, ActivityKind};
use vellum_core::types::{Job, JobId, SubmissionVersion, VersionId};

use crate::error::StoreError;
use crate::store::{ActivityStore, JobStore, VersionStore, WriteOutcome};

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock");
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    status_tag TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    date_created TEXT NOT NULL,
    date_modified TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status_tag);
CREATE INDEX IF NOT EXISTS idx_jobs_type ON jobs(job_type);

CREATE TABLE IF NOT EXISTS submission_versions (
    version_id TEXT PRIMARY KEY,
    submission_id TEXT NOT NULL,
    status_tag TEXT NOT NULL,
    revision INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_versions_submission ON submission_versions(submission_id);
CREATE INDEX IF NOT EXISTS idx_versions_status ON submission_versions(status_tag);

CREATE TABLE IF NOT EXISTS activity (
    activity_id TEXT PRIMARY KEY,
    version_id TEXT NOT NULL,
    job_id TEXT,
    at TEXT NOT NULL,
    kind_tag TEXT NOT NULL,
    payload_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_version_at ON activity(version_id, at);
"#,
        )?;
        Ok(())
    }
}

fn activity_kind_tag(kind: &ActivityKind) -> &'static str {
    match kind {
        ActivityKind::TransitionApplied { .. } => "transition_applied",
        ActivityKind::TransitionDeferred { .. } => "transition_deferred",
        ActivityKind::TransitionFinalized { .. } => "transition_finalized",
        ActivityKind::TransitionAbandoned { .. } => "transition_abandoned",
    }
}

impl JobStore for SqliteStore {
    fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let payload = serde_json::to_string(job)?;
        let conn = self.conn.lock().expect("sqlite connection lock");
        let inserted = conn.execute(
            r#"
INSERT OR IGNORE INTO jobs (job_id, job_type, status_tag, payload_json, date_created, date_modified)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
            params![
                job.id.0,
                job.job_type.as_str(),
                job.status.as_str(),
                payload,
                job.date_created.to_rfc3339(),
                job.date_modified.to_rfc3339(),
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateId { id: job.id.0.clone() });
        }
        Ok(())
    }

    fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock");
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM jobs WHERE job_id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<Job>(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    fn update_job(&self, job: &Job) -> Result<WriteOutcome, StoreError> {
        let payload = serde_json::to_string(job)?;
        let conn = self.conn.lock().expect("sqlite connection lock");
        let updated = conn.execute(
            r#"
UPDATE jobs
SET status_tag = ?1, payload_json = ?2, date_modified = ?3
WHERE job_id = ?4
"#,
            params![
                job.status.as_str(),
                payload,
                job.date_modified.to_rfc3339(),
                job.id.0
            ],
        )?;
        if updated == 0 {
            return Ok(WriteOutcome::Missing);
        }
        Ok(WriteOutcome::Applied)
    }
}

impl VersionStore for SqliteStore {
    fn create_version(&self, version: &SubmissionVersion) -> Result<(), StoreError> {
        let payload = serde_json::to_string(version)?;
        let conn = self.conn.lock().expect("sqlite connection lock");
        let inserted = conn.execute(
            r#"
INSERT OR IGNORE INTO submission_versions
  (version_id, submission_id, status_tag, revision, payload_json, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#,
            params![
                version.id.0,
                version.submission_id.0,
                version.status,
                version.revision as i64,
                payload,
                version.created_at.to_rfc3339(),
                version.updated_at.to_rfc3339(),
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateId {
                id: version.id.0.clone(),
            });
        }
        Ok(())
    }

    fn get_version(&self, id: &VersionId) -> Result<Option<SubmissionVersion>, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock");
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM submission_versions WHERE version_id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<SubmissionVersion>(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    fn update_version(
        &self,
        next: &SubmissionVersion,
        expected_revision: u64,
    ) -> Result<WriteOutcome, StoreError> {
        let now = chrono::Utc::now();
        let mut updated_record = next.clone();
        updated_record.revision = expected_revision + 1;
        updated_record.updated_at = now;
        let payload = serde_json::to_string(&updated_record)?;

        let conn = self.conn.lock().expect("sqlite connection lock");
        let updated = conn.execute(
            r#"
UPDATE submission_versions
SET status_tag = ?1, revision = ?2, payload_json = ?3, updated_at = ?4
WHERE version_id = ?5 AND revision = ?6
"#,
            params![
                updated_record.status,
                updated_record.revision as i64,
                payload,
                now.to_rfc3339(),
                next.id.0,
                expected_revision as i64,
            ],
        )?;
        if updated == 1 {
            return Ok(WriteOutcome::Applied);
        }

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM submission_versions WHERE version_id = ?1",
                params![next.id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(if exists.is_some() {
            WriteOutcome::Conflict
        } else {
            WriteOutcome::Missing
        })
    }
}

impl ActivityStore for SqliteStore {
    fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        let payload = serde_json::to_string(entry)?;
        let conn = self.conn.lock().expect("sqlite connection lock");
        conn.execute(
            r#"
INSERT INTO activity (activity_id, version_id, job_id, at, kind_tag, payload_json)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
            params![
                entry.id.0,
                entry.submission_version_id.0,
                entry.job_id.as_ref().map(|id| id.0.clone()),
                entry.at.to_rfc3339(),
                activity_kind_tag(&entry.kind),
                payload,
            ],
        )?;
        Ok(())
    }

    fn activity_for_version(&self, id: &VersionId) -> Result<Vec<ActivityEntry>, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection lock");
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM activity WHERE version_id = ?1 ORDER BY at ASC, activity_id ASC",
        )?;
        let rows = stmt.query_map(params![id.0], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for row in rows {
            let payload = row?;
            entries.push(serde_json::from_str::<ActivityEntry>(&payload)?);
        }
        Ok(entries)
    }
}

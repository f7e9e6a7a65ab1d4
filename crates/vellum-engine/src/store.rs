//! Persistence collaborator interfaces and the in-memory reference store.
//!
//! The relational layer proper lives outside this engine; these traits are
//! the keyed-store contract it must satisfy. The conditional version write
//! reports conflict distinctly from not-found and from success so the OCC
//! guard can tell a lost race from a missing record.

use std::collections::BTreeMap;
use std::sync::Mutex;

use vellum_core::events::ActivityEntry;
use vellum_core::types::{Job, JobId, SubmissionVersion, VersionId};

use crate::error::StoreError;

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The stored revision no longer matches the one the caller read.
    Conflict,
    Missing,
}

pub trait JobStore: Send + Sync {
    fn create_job(&self, job: &Job) -> Result<(), StoreError>;
    fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError>;
    fn update_job(&self, job: &Job) -> Result<WriteOutcome, StoreError>;
}

pub trait VersionStore: Send + Sync {
    fn create_version(&self, version: &SubmissionVersion) -> Result<(), StoreError>;
    fn get_version(&self, id: &VersionId) -> Result<Option<SubmissionVersion>, StoreError>;
    /// Write `next` only if the stored revision still equals
    /// `expected_revision`; on success the stored revision becomes
    /// `expected_revision + 1`.
    fn update_version(
        &self,
        next: &SubmissionVersion,
        expected_revision: u64,
    ) -> Result<WriteOutcome, StoreError>;
}

pub trait ActivityStore: Send + Sync {
    fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError>;
    fn activity_for_version(&self, id: &VersionId) -> Result<Vec<ActivityEntry>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    jobs: BTreeMap<String, Job>,
    versions: BTreeMap<String, SubmissionVersion>,
    activity: Vec<ActivityEntry>,
}

/// In-memory store used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock");
        if inner.jobs.contains_key(&job.id.0) {
            return Err(StoreError::DuplicateId { id: job.id.0.clone() });
        }
        inner.jobs.insert(job.id.0.clone(), job.clone());
        Ok(())
    }

    fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.lock().expect("memory store lock");
        Ok(inner.jobs.get(&id.0).cloned())
    }

    fn update_job(&self, job: &Job) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock");
        match inner.jobs.get_mut(&job.id.0) {
            Some(existing) => {
                *existing = job.clone();
                Ok(WriteOutcome::Applied)
            }
            None => Ok(WriteOutcome::Missing),
        }
    }
}

impl VersionStore for MemoryStore {
    fn create_version(&self, version: &SubmissionVersion) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock");
        if inner.versions.contains_key(&version.id.0) {
            return Err(StoreError::DuplicateId {
                id: version.id.0.clone(),
            });
        }
        inner.versions.insert(version.id.0.clone(), version.clone());
        Ok(())
    }

    fn get_version(&self, id: &VersionId) -> Result<Option<SubmissionVersion>, StoreError> {
        let inner = self.inner.lock().expect("memory store lock");
        Ok(inner.versions.get(&id.0).cloned())
    }

    fn update_version(
        &self,
        next: &SubmissionVersion,
        expected_revision: u64,
    ) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock");
        match inner.versions.get_mut(&next.id.0) {
            Some(existing) => {
                if existing.revision != expected_revision {
                    return Ok(WriteOutcome::Conflict);
                }
                let mut updated = next.clone();
                updated.revision = expected_revision + 1;
                updated.updated_at = chrono::Utc::now();
                *existing = updated;
                Ok(WriteOutcome::Applied)
            }
            None => Ok(WriteOutcome::Missing),
        }
    }
}

impl ActivityStore for MemoryStore {
    fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock");
        inner.activity.push(entry.clone());
        Ok(())
    }

    fn activity_for_version(&self, id: &VersionId) -> Result<Vec<ActivityEntry>, StoreError> {
        let inner = self.inner.lock().expect("memory store lock");
        Ok(inner
            .activity
            .iter()
            .filter(|entry| &entry.submission_version_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::events::ActivityKind;
    use vellum_core::types::{ActivityId, JobType, SubmissionId};

    fn mk_version(id: &str) -> SubmissionVersion {
        SubmissionVersion::new(VersionId::new(id), SubmissionId("S1".to_string()), "DRAFT")
    }

    #[test]
    fn create_job_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let job = Job::new(JobId::new("J1"), JobType::Check, serde_json::json!({}));
        store.create_job(&job).expect("first create");
        let err = store.create_job(&job).expect_err("duplicate create");
        assert!(matches!(err, StoreError::DuplicateId { id } if id == "J1"));
    }

    #[test]
    fn update_job_reports_missing_for_unknown_id() {
        let store = MemoryStore::new();
        let job = Job::new(JobId::new("J1"), JobType::Check, serde_json::json!({}));
        let outcome = store.update_job(&job).expect("update");
        assert_eq!(outcome, WriteOutcome::Missing);
    }

    #[test]
    fn update_version_applies_when_revision_matches() {
        let store = MemoryStore::new();
        let version = mk_version("V1");
        store.create_version(&version).expect("create");

        let mut next = version.clone();
        next.status = "PENDING".to_string();
        let outcome = store.update_version(&next, 0).expect("update");
        assert_eq!(outcome, WriteOutcome::Applied);

        let stored = store
            .get_version(&VersionId::new("V1"))
            .expect("get")
            .expect("present");
        assert_eq!(stored.status, "PENDING");
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn update_version_conflicts_when_revision_moved() {
        let store = MemoryStore::new();
        let version = mk_version("V1");
        store.create_version(&version).expect("create");

        let mut first = version.clone();
        first.status = "PENDING".to_string();
        assert_eq!(
            store.update_version(&first, 0).expect("first write"),
            WriteOutcome::Applied
        );

        // Second writer still holds revision 0.
        let mut stale = version.clone();
        stale.status = "REJECTED".to_string();
        assert_eq!(
            store.update_version(&stale, 0).expect("stale write"),
            WriteOutcome::Conflict
        );

        let stored = store
            .get_version(&VersionId::new("V1"))
            .expect("get")
            .expect("present");
        assert_eq!(stored.status, "PENDING");
    }

    #[test]
    fn update_version_distinguishes_missing_from_conflict() {
        let store = MemoryStore::new();
        let ghost = mk_version("NOPE");
        assert_eq!(
            store.update_version(&ghost, 0).expect("update"),
            WriteOutcome::Missing
        );
    }

    #[test]
    fn activity_for_version_filters_by_version() {
        let store = MemoryStore::new();
        let entry_v1 = ActivityEntry::new(
            ActivityId("A1".to_string()),
            VersionId::new("V1"),
            ActivityKind::TransitionApplied {
                transition: "submit".to_string(),
                from: "DRAFT".to_string(),
                to: "PENDING".to_string(),
            },
        );
        let entry_v2 = ActivityEntry::new(
            ActivityId("A2".to_string()),
            VersionId::new("V2"),
            ActivityKind::TransitionApplied {
                transition: "submit".to_string(),
                from: "DRAFT".to_string(),
                to: "PENDING".to_string(),
            },
        );
        store.append_activity(&entry_v1).expect("append v1");
        store.append_activity(&entry_v2).expect("append v2");

        let for_v1 = store
            .activity_for_version(&VersionId::new("V1"))
            .expect("list");
        assert_eq!(for_v1, vec![entry_v1]);
    }
}

//! Completion callback: the only write path external workers have.
//!
//! Workers authenticate with the handshake token minted at dispatch; trusted
//! service callers may report without one. The token's subject must match
//! the job id in the path, and when a terminal report finalizes a deferred
//! transition the job's linked version must match the version the caller
//! names. All binding failures collapse to `Unauthorized` so a probing
//! caller learns nothing about what exists.

use std::sync::Arc;

use chrono::Utc;

use vellum_core::events::{ActivityEntry, ActivityKind};
use vellum_core::types::{ActivityId, Job, JobId, JobStatus, SubmissionVersion, VersionId};

use crate::context::RequestContext;
use crate::error::EngineError;
use crate::store::{ActivityStore, JobStore, VersionStore, WriteOutcome};
use crate::token::TokenIssuer;

/// Fields a worker may report back. Everything is optional; a patch with no
/// status change just accumulates messages or results.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub message: Option<String>,
    pub results: Option<serde_json::Value>,
    /// Version the worker claims to have acted on. Required when the report
    /// finalizes a deferred transition.
    pub submission_version_id: Option<VersionId>,
}

pub struct CompletionHandler {
    tokens: TokenIssuer,
    jobs: Arc<dyn JobStore>,
    versions: Arc<dyn VersionStore>,
    activity: Arc<dyn ActivityStore>,
}

impl CompletionHandler {
    pub fn new(
        tokens: TokenIssuer,
        jobs: Arc<dyn JobStore>,
        versions: Arc<dyn VersionStore>,
        activity: Arc<dyn ActivityStore>,
    ) -> Self {
        Self {
            tokens,
            jobs,
            versions,
            activity,
        }
    }

    /// Applies a completion report to a job. Workers present the handshake
    /// token; a trusted service caller (e.g. an operator patching a stuck
    /// job) may omit it.
    pub fn update(
        &self,
        ctx: &RequestContext,
        token: Option<&str>,
        job_id: &JobId,
        patch: JobPatch,
    ) -> Result<Job, EngineError> {
        match token {
            Some(token) => {
                let claims = self.tokens.verify(token)?;
                if claims.sub != job_id.0 {
                    tracing::warn!(job_id = %job_id, "callback rejected: token bound to another job");
                    return Err(EngineError::Unauthorized);
                }
            }
            None if ctx.trusted => {}
            None => {
                tracing::warn!(job_id = %job_id, "callback rejected: no credential presented");
                return Err(EngineError::Unauthorized);
            }
        }

        let mut job = self
            .jobs
            .get_job(job_id)?
            .ok_or_else(|| EngineError::NotFound {
                resource: format!("job '{job_id}'"),
            })?;
        if job.status.is_terminal() {
            return Err(EngineError::JobAlreadyTerminal);
        }
        let was_running = job.status == JobStatus::Running;

        if let Some(message) = patch.message {
            job.messages.push(message);
        }
        if let Some(results) = patch.results {
            job.results = results;
        }
        if let Some(status) = patch.status {
            job.status = status;
        }
        job.date_modified = Utc::now();

        if job.status.is_terminal() {
            if let Some(linked) = job.submission_version_id.clone() {
                match &patch.submission_version_id {
                    Some(named) if *named == linked && was_running => {}
                    _ => {
                        tracing::warn!(
                            job_id = %job_id,
                            "callback rejected: version binding mismatch"
                        );
                        return Err(EngineError::Unauthorized);
                    }
                }
                self.finalize_transition(&job, &linked)?;
            }
        }

        match self.jobs.update_job(&job)? {
            WriteOutcome::Applied => {}
            _ => {
                return Err(EngineError::NotFound {
                    resource: format!("job '{job_id}'"),
                })
            }
        }
        tracing::info!(job_id = %job_id, status = %job.status, "callback applied");
        Ok(job)
    }

    /// Direct status write for trusted workers, used by the site-facing
    /// status endpoint. The handshake must belong to a Running job linked to
    /// the named version.
    pub fn set_status(
        &self,
        token: &str,
        version_id: &VersionId,
        new_status: &str,
    ) -> Result<SubmissionVersion, EngineError> {
        let claims = self.tokens.verify(token)?;
        let job = self
            .jobs
            .get_job(&claims.job_id())?
            .ok_or(EngineError::Unauthorized)?;
        if job.status != JobStatus::Running
            || job.submission_version_id.as_ref() != Some(version_id)
        {
            tracing::warn!(version_id = %version_id, "status write rejected: job not bound");
            return Err(EngineError::Unauthorized);
        }

        let version =
            self.versions
                .get_version(version_id)?
                .ok_or_else(|| EngineError::NotFound {
                    resource: format!("submission version '{version_id}'"),
                })?;
        let expected = version.revision;
        let mut next = version;
        next.status = new_status.to_string();
        match self.versions.update_version(&next, expected)? {
            WriteOutcome::Applied => {}
            WriteOutcome::Conflict => {
                return Err(EngineError::ConcurrentModification { attempts: 1 })
            }
            WriteOutcome::Missing => {
                return Err(EngineError::NotFound {
                    resource: format!("submission version '{version_id}'"),
                })
            }
        }
        self.versions
            .get_version(version_id)?
            .ok_or_else(|| EngineError::NotFound {
                resource: format!("submission version '{version_id}'"),
            })
    }

    /// Flips a version out of its pending transition based on the terminal
    /// job status. Completed applies the transition's target; Failed leaves
    /// the source state and just clears the marker.
    ///
    /// The version is written before the job row, so a report retried after
    /// a lost job write finds the version already settled; that retry leaves
    /// the version untouched and only the job write happens again.
    fn finalize_transition(&self, job: &Job, version_id: &VersionId) -> Result<(), EngineError> {
        let version =
            self.versions
                .get_version(version_id)?
                .ok_or_else(|| EngineError::NotFound {
                    resource: format!("submission version '{version_id}'"),
                })?;

        let transition = job
            .payload
            .get("transition")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let target = job
            .payload
            .get("target")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let Some(pending) = version.pending_transition.clone() else {
            let already_settled = match job.status {
                JobStatus::Completed => version.status == target,
                _ => version.status != target,
            };
            if already_settled {
                return Ok(());
            }
            tracing::warn!(
                job_id = %job.id,
                version_id = %version_id,
                "callback rejected: no matching pending transition"
            );
            return Err(EngineError::Unauthorized);
        };
        match &transition {
            Some(named) if *named == pending => {}
            _ => {
                tracing::warn!(
                    job_id = %job.id,
                    version_id = %version_id,
                    "callback rejected: no matching pending transition"
                );
                return Err(EngineError::Unauthorized);
            }
        }
        let transition = transition.unwrap_or_default();

        let expected = version.revision;
        let mut next = version;
        next.pending_transition = None;

        let kind = if job.status == JobStatus::Completed {
            if job
                .payload
                .get("sets_published_date")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                next.published_at = Some(Utc::now());
            }
            next.status = target.clone();
            ActivityKind::TransitionFinalized {
                transition,
                to: target,
                job_id: job.id.clone(),
            }
        } else {
            ActivityKind::TransitionAbandoned {
                transition,
                job_id: job.id.clone(),
            }
        };

        match self.versions.update_version(&next, expected)? {
            WriteOutcome::Applied => {}
            WriteOutcome::Conflict => {
                return Err(EngineError::ConcurrentModification { attempts: 1 })
            }
            WriteOutcome::Missing => {
                return Err(EngineError::NotFound {
                    resource: format!("submission version '{version_id}'"),
                })
            }
        }

        self.activity.append_activity(&ActivityEntry::new(
            ActivityId(format!("act-{}-{}", next.id, expected + 1)),
            next.id.clone(),
            kind,
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::types::{JobType, SubmissionId};

    use crate::store::MemoryStore;

    const SECRET: &[u8] = b"callback-secret";

    fn worker() -> RequestContext {
        RequestContext::user("worker-7", Vec::new())
    }

    fn handler_with_store() -> (Arc<MemoryStore>, CompletionHandler) {
        let store = Arc::new(MemoryStore::new());
        let handler = CompletionHandler::new(
            TokenIssuer::new("vellum", 300, SECRET),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        (store, handler)
    }

    fn seed_pending_publish(store: &MemoryStore) -> (JobId, String) {
        let mut version = SubmissionVersion::new(
            VersionId::new("V1"),
            SubmissionId("S1".to_string()),
            "PENDING",
        );
        version.pending_transition = Some("publish".to_string());
        store.create_version(&version).expect("seed version");

        let mut job = Job::new(
            JobId::new("J1"),
            JobType::Publish,
            serde_json::json!({
                "version_id": "V1",
                "transition": "publish",
                "target": "PUBLISHED",
                "sets_published_date": true,
            }),
        )
        .with_version(VersionId::new("V1"));
        job.mark_running();
        store.create_job(&job).expect("seed job");

        let token = TokenIssuer::new("vellum", 300, SECRET)
            .issue(&JobId::new("J1"), &JobType::Publish)
            .expect("issue");
        (JobId::new("J1"), token)
    }

    fn completed_patch() -> JobPatch {
        JobPatch {
            status: Some(JobStatus::Completed),
            message: Some("rendered and uploaded".to_string()),
            results: Some(serde_json::json!({"pages": 12})),
            submission_version_id: Some(VersionId::new("V1")),
        }
    }

    #[test]
    fn completed_report_finalizes_the_pending_transition() {
        let (store, handler) = handler_with_store();
        let (job_id, token) = seed_pending_publish(&store);

        let job = handler
            .update(&worker(), Some(&token), &job_id, completed_patch())
            .expect("update");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.results["pages"], 12);

        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert_eq!(version.status, "PUBLISHED");
        assert!(!version.has_pending_transition());
        assert!(version.published_at.is_some());

        let log = store
            .activity_for_version(&VersionId::new("V1"))
            .expect("activity");
        assert!(matches!(
            log.last().unwrap().kind,
            ActivityKind::TransitionFinalized { .. }
        ));
    }

    #[test]
    fn failed_report_abandons_the_transition_in_the_source_state() {
        let (store, handler) = handler_with_store();
        let (job_id, token) = seed_pending_publish(&store);

        let patch = JobPatch {
            status: Some(JobStatus::Failed),
            message: Some("render crashed".to_string()),
            results: None,
            submission_version_id: Some(VersionId::new("V1")),
        };
        let job = handler.update(&worker(), Some(&token), &job_id, patch).expect("update");
        assert_eq!(job.status, JobStatus::Failed);

        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert_eq!(version.status, "PENDING");
        assert!(!version.has_pending_transition());
        assert!(version.published_at.is_none());

        let log = store
            .activity_for_version(&VersionId::new("V1"))
            .expect("activity");
        assert!(matches!(
            log.last().unwrap().kind,
            ActivityKind::TransitionAbandoned { .. }
        ));
    }

    #[test]
    fn token_bound_to_another_job_is_rejected() {
        let (store, handler) = handler_with_store();
        let (_job_id, _token) = seed_pending_publish(&store);

        let other_token = TokenIssuer::new("vellum", 300, SECRET)
            .issue(&JobId::new("J2"), &JobType::Publish)
            .unwrap();
        let err = handler
            .update(&worker(), Some(&other_token), &JobId::new("J1"), completed_patch())
            .expect_err("mismatch");
        assert!(matches!(err, EngineError::Unauthorized));

        // Nothing moved.
        let job = store.get_job(&JobId::new("J1")).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert_eq!(version.status, "PENDING");
        assert!(version.has_pending_transition());
    }

    #[test]
    fn naming_the_wrong_version_leaves_every_record_unmodified() {
        let (store, handler) = handler_with_store();
        let (job_id, token) = seed_pending_publish(&store);

        let mut patch = completed_patch();
        patch.submission_version_id = Some(VersionId::new("V2"));
        let err = handler.update(&worker(), Some(&token), &job_id, patch).expect_err("bad binding");
        assert!(matches!(err, EngineError::Unauthorized));

        let job = store.get_job(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.messages.is_empty());
        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert_eq!(version.status, "PENDING");
        assert!(version.has_pending_transition());
    }

    #[test]
    fn omitting_the_version_on_a_terminal_report_is_rejected() {
        let (store, handler) = handler_with_store();
        let (job_id, token) = seed_pending_publish(&store);

        let mut patch = completed_patch();
        patch.submission_version_id = None;
        let err = handler.update(&worker(), Some(&token), &job_id, patch).expect_err("no binding");
        assert!(matches!(err, EngineError::Unauthorized));
    }

    #[test]
    fn terminal_jobs_refuse_further_updates() {
        let (store, handler) = handler_with_store();
        let (job_id, token) = seed_pending_publish(&store);

        handler
            .update(&worker(), Some(&token), &job_id, completed_patch())
            .expect("first");
        let err = handler
            .update(&worker(), Some(&token), &job_id, completed_patch())
            .expect_err("second");
        assert!(matches!(err, EngineError::JobAlreadyTerminal));

        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert_eq!(version.revision, 1);
    }

    #[test]
    fn progress_patch_accumulates_messages_without_finalizing() {
        let (store, handler) = handler_with_store();
        let (job_id, token) = seed_pending_publish(&store);

        let patch = JobPatch {
            status: None,
            message: Some("rendering page 3 of 12".to_string()),
            results: None,
            submission_version_id: None,
        };
        let job = handler.update(&worker(), Some(&token), &job_id, patch).expect("update");
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.messages.len(), 1);

        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert!(version.has_pending_transition());
    }

    #[test]
    fn direct_status_write_requires_a_bound_running_job() {
        let (store, handler) = handler_with_store();
        let (_job_id, token) = seed_pending_publish(&store);

        let version = handler
            .set_status(&token, &VersionId::new("V1"), "PUBLISHED")
            .expect("set status");
        assert_eq!(version.status, "PUBLISHED");
        assert_eq!(version.revision, 1);

        // A token for an unlinked job cannot write.
        let mut loose_job = Job::new(JobId::new("J9"), JobType::Check, serde_json::json!({}));
        loose_job.mark_running();
        store.create_job(&loose_job).unwrap();
        let loose_token = TokenIssuer::new("vellum", 300, SECRET)
            .issue(&JobId::new("J9"), &JobType::Check)
            .unwrap();
        let err = handler
            .set_status(&loose_token, &VersionId::new("V1"), "REJECTED")
            .expect_err("unbound");
        assert!(matches!(err, EngineError::Unauthorized));
    }

    #[test]
    fn trusted_service_may_report_without_a_handshake() {
        let (store, handler) = handler_with_store();
        let (job_id, _token) = seed_pending_publish(&store);

        let job = handler
            .update(
                &RequestContext::trusted_service(),
                None,
                &job_id,
                completed_patch(),
            )
            .expect("trusted update");
        assert_eq!(job.status, JobStatus::Completed);

        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert_eq!(version.status, "PUBLISHED");
        assert!(!version.has_pending_transition());
    }

    #[test]
    fn untrusted_caller_without_a_handshake_is_rejected() {
        let (store, handler) = handler_with_store();
        let (job_id, _token) = seed_pending_publish(&store);

        let err = handler
            .update(&worker(), None, &job_id, completed_patch())
            .expect_err("no credential");
        assert!(matches!(err, EngineError::Unauthorized));

        let job = store.get_job(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert!(version.has_pending_transition());
    }

    /// Job store that drops the next update on the floor, standing in for a
    /// write lost between the version flip and the job write.
    struct FlakyJobStore {
        inner: Arc<MemoryStore>,
        fail_next_update: std::sync::atomic::AtomicBool,
    }

    impl crate::store::JobStore for FlakyJobStore {
        fn create_job(&self, job: &Job) -> Result<(), crate::error::StoreError> {
            self.inner.create_job(job)
        }

        fn get_job(&self, id: &JobId) -> Result<Option<Job>, crate::error::StoreError> {
            self.inner.get_job(id)
        }

        fn update_job(&self, job: &Job) -> Result<WriteOutcome, crate::error::StoreError> {
            if self
                .fail_next_update
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(crate::error::StoreError::Sql {
                    source: rusqlite::Error::InvalidQuery,
                });
            }
            self.inner.update_job(job)
        }
    }

    #[test]
    fn retried_report_after_lost_job_write_settles_cleanly() {
        let store = Arc::new(MemoryStore::new());
        let (job_id, token) = seed_pending_publish(&store);
        let handler = CompletionHandler::new(
            TokenIssuer::new("vellum", 300, SECRET),
            Arc::new(FlakyJobStore {
                inner: store.clone(),
                fail_next_update: std::sync::atomic::AtomicBool::new(true),
            }),
            store.clone(),
            store.clone(),
        );

        // First report: the version flips but the job write is lost.
        let err = handler
            .update(&worker(), Some(&token), &job_id, completed_patch())
            .expect_err("job write lost");
        assert!(matches!(err, EngineError::Store(_)));

        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert_eq!(version.status, "PUBLISHED");
        assert!(!version.has_pending_transition());
        assert_eq!(store.get_job(&job_id).unwrap().unwrap().status, JobStatus::Running);

        // The worker retries with the same token; the version is untouched
        // and only the job write happens again.
        let job = handler
            .update(&worker(), Some(&token), &job_id, completed_patch())
            .expect("retry");
        assert_eq!(job.status, JobStatus::Completed);

        let version = store.get_version(&VersionId::new("V1")).unwrap().unwrap();
        assert_eq!(version.status, "PUBLISHED");
        assert_eq!(version.revision, 1);

        let log = store
            .activity_for_version(&VersionId::new("V1"))
            .expect("activity");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn expired_or_garbage_token_is_unauthorized() {
        let (store, handler) = handler_with_store();
        let (job_id, _token) = seed_pending_publish(&store);

        let err = handler
            .update(&worker(), Some("garbage"), &job_id, completed_patch())
            .expect_err("garbage token");
        assert!(matches!(err, EngineError::Unauthorized));
    }
}

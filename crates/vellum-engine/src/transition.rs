//! Transition executor.
//!
//! Applies workflow transitions to submission versions. Immediate
//! transitions land in a single conditional write; job-gated transitions
//! record a pending marker, dispatch a job, and leave the status flip to the
//! completion callback.

use std::sync::Arc;

use chrono::Utc;

use vellum_core::events::{ActivityEntry, ActivityKind};
use vellum_core::types::{ActivityId, Job, JobId, JobStatus, SubmissionVersion, VersionId};
use vellum_core::workflow::{Transition, Workflow};

use crate::context::RequestContext;
use crate::error::EngineError;
use crate::orchestrator::{JobCreateRequest, JobOrchestrator};
use crate::store::{ActivityStore, VersionStore, WriteOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition landed immediately; carries the updated version.
    Applied(SubmissionVersion),
    /// The transition is gated on a job that was just dispatched.
    Deferred { job_id: JobId },
}

pub struct TransitionExecutor {
    versions: Arc<dyn VersionStore>,
    activity: Arc<dyn ActivityStore>,
    orchestrator: Arc<JobOrchestrator>,
}

impl TransitionExecutor {
    pub fn new(
        versions: Arc<dyn VersionStore>,
        activity: Arc<dyn ActivityStore>,
        orchestrator: Arc<JobOrchestrator>,
    ) -> Self {
        Self {
            versions,
            activity,
            orchestrator,
        }
    }

    /// Attempts to move a submission version to `target`.
    ///
    /// Check order is fixed: unknown edge, then missing scopes, then an
    /// already-pending gated transition. A caller lacking scopes for an edge
    /// that does not exist sees the unknown-edge error.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        version_id: &VersionId,
        workflow: &Workflow,
        target: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        let version = self
            .versions
            .get_version(version_id)?
            .ok_or_else(|| EngineError::NotFound {
                resource: format!("submission version '{version_id}'"),
            })?;

        let transition = workflow
            .valid_transition(&version.status, target)
            .ok_or_else(|| EngineError::NoSuchTransition {
                from: version.status.clone(),
                to: target.to_string(),
            })?;

        let missing = ctx.missing_scopes(&transition.required_scopes);
        if !missing.is_empty() {
            tracing::warn!(
                transition = %transition.name,
                version_id = %version_id,
                "transition refused: missing scopes"
            );
            return Err(EngineError::Forbidden {
                transition: transition.name.clone(),
                missing_scopes: missing,
            });
        }

        if let Some(pending) = &version.pending_transition {
            return Err(EngineError::TransitionAlreadyPending {
                pending: pending.clone(),
            });
        }

        if transition.requires_job {
            self.execute_deferred(ctx, version, transition).await
        } else {
            self.execute_immediate(version, transition, target)
        }
    }

    fn execute_immediate(
        &self,
        version: SubmissionVersion,
        transition: &Transition,
        target: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        let from = version.status.clone();
        let expected = version.revision;

        let mut next = version;
        next.status = target.to_string();
        if transition.options.sets_published_date {
            next.published_at = Some(Utc::now());
        }

        match self.versions.update_version(&next, expected)? {
            WriteOutcome::Applied => {}
            WriteOutcome::Conflict => {
                return Err(EngineError::ConcurrentModification { attempts: 1 })
            }
            WriteOutcome::Missing => {
                return Err(EngineError::NotFound {
                    resource: format!("submission version '{}'", next.id),
                })
            }
        }

        self.activity.append_activity(&ActivityEntry::new(
            ActivityId(format!("act-{}-{}", next.id, expected + 1)),
            next.id.clone(),
            ActivityKind::TransitionApplied {
                transition: transition.name.clone(),
                from,
                to: target.to_string(),
            },
        ))?;

        let stored = self
            .versions
            .get_version(&next.id)?
            .ok_or_else(|| EngineError::NotFound {
                resource: format!("submission version '{}'", next.id),
            })?;
        tracing::info!(version_id = %stored.id, to = %stored.status, "transition applied");
        Ok(TransitionOutcome::Applied(stored))
    }

    async fn execute_deferred(
        &self,
        ctx: &RequestContext,
        version: SubmissionVersion,
        transition: &Transition,
    ) -> Result<TransitionOutcome, EngineError> {
        let job_type = transition
            .job_type
            .clone()
            .ok_or_else(|| EngineError::JobDispatchFailed {
                reason: format!("transition '{}' names no job type", transition.name),
            })?;

        // Pending marker goes in first so a concurrent request loses the
        // revision race instead of dispatching a second job.
        let expected = version.revision;
        let mut marked = version.clone();
        marked.pending_transition = Some(transition.name.clone());
        match self.versions.update_version(&marked, expected)? {
            WriteOutcome::Applied => {}
            WriteOutcome::Conflict => {
                return Err(EngineError::ConcurrentModification { attempts: 1 })
            }
            WriteOutcome::Missing => {
                return Err(EngineError::NotFound {
                    resource: format!("submission version '{}'", version.id),
                })
            }
        }

        let payload = serde_json::json!({
            "version_id": version.id,
            "transition": transition.name,
            "target": transition.target_state,
            "sets_published_date": transition.options.sets_published_date,
        });
        let created = self
            .orchestrator
            .create(
                ctx,
                JobCreateRequest {
                    job_type,
                    payload,
                    submission_version_id: Some(version.id.clone()),
                },
            )
            .await;

        let job = match created {
            Ok(job) => job,
            Err(err) => {
                // Roll the marker back so the version is not wedged behind a
                // job that never existed.
                if let Some(mut fresh) = self.versions.get_version(&version.id)? {
                    let fresh_revision = fresh.revision;
                    fresh.pending_transition = None;
                    let _ = self.versions.update_version(&fresh, fresh_revision)?;
                }
                return Err(err);
            }
        };

        self.activity.append_activity(&ActivityEntry::new(
            ActivityId(format!("act-{}-{}", version.id, expected + 1)),
            version.id.clone(),
            ActivityKind::TransitionDeferred {
                transition: transition.name.clone(),
                job_id: job.id.clone(),
            },
        ))?;

        tracing::info!(
            version_id = %version.id,
            transition = %transition.name,
            job_id = %job.id,
            "transition deferred"
        );

        // In-process handlers (checks) persist their job already terminal and
        // no external callback will arrive, so the marker is settled here.
        if job.status.is_terminal() {
            self.settle_in_process(&version.id, transition, &job)?;
        }

        Ok(TransitionOutcome::Deferred { job_id: job.id })
    }

    /// Mirrors the completion callback's finalize step for jobs that reach a
    /// terminal state before `create` returns. Completed applies the target
    /// state; Failed leaves the source state and clears the marker.
    fn settle_in_process(
        &self,
        version_id: &VersionId,
        transition: &Transition,
        job: &Job,
    ) -> Result<(), EngineError> {
        let version = self
            .versions
            .get_version(version_id)?
            .ok_or_else(|| EngineError::NotFound {
                resource: format!("submission version '{version_id}'"),
            })?;
        if version.pending_transition.as_deref() != Some(transition.name.as_str()) {
            return Ok(());
        }

        let expected = version.revision;
        let mut next = version;
        next.pending_transition = None;

        let kind = if job.status == JobStatus::Completed {
            if transition.options.sets_published_date {
                next.published_at = Some(Utc::now());
            }
            next.status = transition.target_state.clone();
            ActivityKind::TransitionFinalized {
                transition: transition.name.clone(),
                to: transition.target_state.clone(),
                job_id: job.id.clone(),
            }
        } else {
            ActivityKind::TransitionAbandoned {
                transition: transition.name.clone(),
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
        tracing::info!(
            version_id = %next.id,
            transition = %transition.name,
            status = %job.status,
            "gated transition settled in process"
        );
        Ok(())
    }
}

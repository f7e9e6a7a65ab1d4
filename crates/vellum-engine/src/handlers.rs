//! Core job handlers.
//!
//! Publish and unpublish jobs are executed by external workers: the handler
//! publishes a dispatch message first and only persists the job row once the
//! message is out, so a transport failure leaves no orphan row behind. Check
//! jobs run in process and reach a terminal state before `create` returns.

use async_trait::async_trait;

use vellum_core::types::Job;

use crate::context::{CheckContext, RequestContext};
use crate::error::EngineError;
use crate::registry::{DispatchEnv, JobHandler};
use crate::runner::run_checks;
use crate::transport::JobMessage;

/// Hands the job to an external worker over the message transport.
pub struct OutboundJobHandler;

#[async_trait]
impl JobHandler for OutboundJobHandler {
    async fn dispatch(
        &self,
        _ctx: &RequestContext,
        job: &mut Job,
        env: &DispatchEnv,
    ) -> Result<(), EngineError> {
        let message = JobMessage {
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            handshake: env.handshake.clone(),
            job_url: env.job_url.clone(),
            payload: job.payload.clone(),
        };
        env.transport
            .publish(&message)
            .map_err(|e| EngineError::JobDispatchFailed {
                reason: e.to_string(),
            })?;

        job.mark_running();
        env.jobs.create_job(job)?;
        tracing::info!(job_id = %job.id, job_type = %job.job_type, "job dispatched");
        Ok(())
    }
}

/// Runs validation checks in process and persists the job already terminal.
pub struct CheckJobHandler {
    run_all: bool,
}

impl CheckJobHandler {
    /// Runs the check ids named in the job payload.
    pub fn selected() -> Self {
        Self { run_all: false }
    }

    /// Ignores the payload selection and runs every registered check.
    pub fn run_all() -> Self {
        Self { run_all: true }
    }
}

#[async_trait]
impl JobHandler for CheckJobHandler {
    async fn dispatch(
        &self,
        _ctx: &RequestContext,
        job: &mut Job,
        env: &DispatchEnv,
    ) -> Result<(), EngineError> {
        let check_ids: Vec<String> = if self.run_all {
            Vec::new()
        } else {
            job.payload
                .get("check_ids")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default()
        };

        // A job linked to a version checks that version's stored metadata;
        // an unlinked job checks whatever the payload carries.
        let ctx = match &job.submission_version_id {
            Some(version_id) => {
                let version = env.versions.get_version(version_id)?.ok_or_else(|| {
                    EngineError::NotFound {
                        resource: format!("submission version '{version_id}'"),
                    }
                })?;
                CheckContext::for_version(&version)
            }
            None => {
                let metadata = job
                    .payload
                    .get("metadata")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                CheckContext::ad_hoc(metadata)
            }
        };

        let report = run_checks(&ctx, &check_ids, &env.checks, env.check_limit).await;
        let results = serde_json::to_value(&report).map_err(crate::error::StoreError::from)?;

        if report.success() {
            job.mark_completed(results);
        } else {
            job.results = results;
            job.mark_failed(format!(
                "{} checks failed, {} errored",
                report.summary.failed, report.summary.errored
            ));
        }
        env.jobs.create_job(job)?;
        Ok(())
    }
}

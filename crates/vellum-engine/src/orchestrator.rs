//! Job orchestrator: the single entry point for creating jobs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use vellum_core::types::{Job, JobId, JobType, VersionId};

use crate::context::RequestContext;
use crate::error::EngineError;
use crate::registry::{DispatchEnv, HandlerRegistry};
use crate::runner::CheckImplementation;
use crate::storage::StorageFactory;
use crate::store::{JobStore, VersionStore};
use crate::token::TokenIssuer;
use crate::transport::MessageTransport;

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let timestamp = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_millis().saturating_mul(1_000_000));
    let ts = u128::from(timestamp.unsigned_abs());
    format!(
        "{prefix}-{head:08x}-{mid:04x}-{tail:04x}",
        head = (ts & 0xffff_ffff),
        mid = ((ts >> 32) & 0xffff),
        tail = sequence & 0xffff,
    )
}

#[derive(Debug, Clone)]
pub struct JobCreateRequest {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub submission_version_id: Option<VersionId>,
}

pub struct JobOrchestrator {
    registry: HandlerRegistry,
    tokens: TokenIssuer,
    jobs: Arc<dyn JobStore>,
    versions: Arc<dyn VersionStore>,
    transport: Arc<dyn MessageTransport>,
    storage_factory: StorageFactory,
    checks: Arc<Vec<Arc<dyn CheckImplementation>>>,
    check_limit: usize,
    base_url: String,
}

impl JobOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: HandlerRegistry,
        tokens: TokenIssuer,
        jobs: Arc<dyn JobStore>,
        versions: Arc<dyn VersionStore>,
        transport: Arc<dyn MessageTransport>,
        storage_factory: StorageFactory,
        checks: Vec<Arc<dyn CheckImplementation>>,
        check_limit: usize,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            tokens,
            jobs,
            versions,
            transport,
            storage_factory,
            checks: Arc::new(checks),
            check_limit,
            base_url: base_url.into(),
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Creates and dispatches a job.
    ///
    /// The handler is resolved first, then the storage handle is built only
    /// when the registration requires one. The handler persists the job row;
    /// a dispatch failure therefore aborts creation with nothing stored.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        request: JobCreateRequest,
    ) -> Result<Job, EngineError> {
        let registration = self.registry.resolve(&request.job_type)?;

        let job_id = JobId::new(next_id("job"));
        let handshake = self.tokens.issue(&job_id, &request.job_type)?;
        let job_url = format!("{}/jobs/{}", self.base_url.trim_end_matches('/'), job_id);

        let storage = if registration.requires_storage() {
            let handle =
                (self.storage_factory)().map_err(|e| EngineError::JobDispatchFailed {
                    reason: e.to_string(),
                })?;
            Some(handle)
        } else {
            None
        };

        let mut job = Job::new(job_id, request.job_type, request.payload);
        if let Some(version_id) = request.submission_version_id {
            job = job.with_version(version_id);
        }

        let env = DispatchEnv {
            jobs: Arc::clone(&self.jobs),
            versions: Arc::clone(&self.versions),
            transport: Arc::clone(&self.transport),
            storage,
            checks: Arc::clone(&self.checks),
            check_limit: self.check_limit,
            job_url,
            handshake,
        };
        registration.handler().dispatch(ctx, &mut job, &env).await?;

        tracing::info!(job_id = %job.id, job_type = %job.job_type, status = %job.status, "job created");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use vellum_core::types::JobStatus;

    use crate::storage::{MemoryStorage, StorageBackend, StorageError};
    use crate::store::MemoryStore;
    use crate::transport::{CaptureTransport, RejectingTransport};

    fn counting_factory(counter: Arc<AtomicUsize>) -> StorageFactory {
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryStorage::new()) as Arc<dyn StorageBackend>)
        })
    }

    fn orchestrator_with(
        transport: Arc<dyn MessageTransport>,
        factory: StorageFactory,
    ) -> (Arc<MemoryStore>, JobOrchestrator) {
        let jobs = Arc::new(MemoryStore::new());
        let orchestrator = JobOrchestrator::new(
            HandlerRegistry::with_core_handlers(),
            TokenIssuer::new("vellum", 300, b"secret"),
            jobs.clone(),
            jobs.clone(),
            transport,
            factory,
            Vec::new(),
            25,
            "http://localhost:8080/",
        );
        (jobs, orchestrator)
    }

    #[tokio::test]
    async fn publish_job_is_dispatched_and_persisted_running() {
        let transport = Arc::new(CaptureTransport::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let (jobs, orchestrator) =
            orchestrator_with(transport.clone(), counting_factory(counter.clone()));

        let job = orchestrator
            .create(
                &RequestContext::trusted_service(),
                JobCreateRequest {
                    job_type: JobType::Publish,
                    payload: serde_json::json!({"version": "V1"}),
                    submission_version_id: Some(VersionId::new("V1")),
                },
            )
            .await
            .expect("create");

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.submission_version_id, Some(VersionId::new("V1")));

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].job_id, job.id);
        assert_eq!(
            published[0].job_url,
            format!("http://localhost:8080/jobs/{}", job.id)
        );

        // The handshake in the message verifies and binds to this job.
        let claims = orchestrator
            .tokens()
            .verify(&published[0].handshake)
            .expect("verify");
        assert_eq!(claims.job_id(), job.id);
        assert_eq!(claims.job_type, "publish");

        assert!(jobs.get_job(&job.id).unwrap().is_some());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_failure_aborts_with_no_orphan_row() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (jobs, orchestrator) = orchestrator_with(
            Arc::new(RejectingTransport),
            counting_factory(counter.clone()),
        );

        let err = orchestrator
            .create(
                &RequestContext::trusted_service(),
                JobCreateRequest {
                    job_type: JobType::Publish,
                    payload: serde_json::json!({}),
                    submission_version_id: None,
                },
            )
            .await
            .expect_err("dispatch fails");
        assert!(matches!(err, EngineError::JobDispatchFailed { .. }));

        let inner = jobs.get_job(&JobId::new("any")).unwrap();
        assert!(inner.is_none());
    }

    #[tokio::test]
    async fn unknown_job_type_is_rejected_before_any_side_effect() {
        let transport = Arc::new(CaptureTransport::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let (_jobs, orchestrator) =
            orchestrator_with(transport.clone(), counting_factory(counter.clone()));

        let err = orchestrator
            .create(
                &RequestContext::trusted_service(),
                JobCreateRequest {
                    job_type: JobType::Extension("datacite_deposit".to_string()),
                    payload: serde_json::json!({}),
                    submission_version_id: None,
                },
            )
            .await
            .expect_err("unknown type");
        assert!(matches!(err, EngineError::UnknownJobType(_)));
        assert!(transport.published().is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn storage_handle_is_not_built_for_check_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (_jobs, orchestrator) = orchestrator_with(
            Arc::new(CaptureTransport::new()),
            counting_factory(counter.clone()),
        );

        orchestrator
            .create(
                &RequestContext::trusted_service(),
                JobCreateRequest {
                    job_type: JobType::Check,
                    payload: serde_json::json!({}),
                    submission_version_id: None,
                },
            )
            .await
            .expect("create");
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn storage_factory_failure_surfaces_as_dispatch_failure() {
        let failing: StorageFactory = Arc::new(|| {
            Err(StorageError::Unavailable {
                message: "bucket unreachable".to_string(),
            })
        });
        let (jobs, orchestrator) =
            orchestrator_with(Arc::new(CaptureTransport::new()), failing);

        let err = orchestrator
            .create(
                &RequestContext::trusted_service(),
                JobCreateRequest {
                    job_type: JobType::Unpublish,
                    payload: serde_json::json!({}),
                    submission_version_id: None,
                },
            )
            .await
            .expect_err("factory fails");
        assert!(matches!(err, EngineError::JobDispatchFailed { .. }));
        assert!(jobs.get_job(&JobId::new("any")).unwrap().is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = next_id("job");
        let b = next_id("job");
        assert_ne!(a, b);
        assert!(a.starts_with("job-"));
    }
}

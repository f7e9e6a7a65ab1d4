//! Activity log entries appended as submission versions move through the
//! workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActivityId, JobId, VersionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// An immediate transition was applied in a single write.
    TransitionApplied {
        transition: String,
        from: String,
        to: String,
    },
    /// A job-gated transition was recorded as pending and a job dispatched.
    TransitionDeferred { transition: String, job_id: JobId },
    /// A deferred transition's job reached a terminal state and the status
    /// flip was applied.
    TransitionFinalized {
        transition: String,
        to: String,
        job_id: JobId,
    },
    /// A job gating a transition failed; the version stays in its source
    /// state with the pending marker cleared.
    TransitionAbandoned { transition: String, job_id: JobId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: ActivityId,
    pub submission_version_id: VersionId,
    pub job_id: Option<JobId>,
    pub at: DateTime<Utc>,
    pub kind: ActivityKind,
}

impl ActivityEntry {
    pub fn new(id: ActivityId, version_id: VersionId, kind: ActivityKind) -> Self {
        let job_id = match &kind {
            ActivityKind::TransitionApplied { .. } => None,
            ActivityKind::TransitionDeferred { job_id, .. }
            | ActivityKind::TransitionFinalized { job_id, .. }
            | ActivityKind::TransitionAbandoned { job_id, .. } => Some(job_id.clone()),
        };
        Self {
            id,
            submission_version_id: version_id,
            job_id,
            at: Utc::now(),
            kind,
        }
    }
}

//! Wire shapes for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vellum_core::types::{Job, SubmissionVersion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub job_type: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub results: serde_json::Value,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_version_id: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.0.clone(),
            job_type: job.job_type.as_str().to_string(),
            status: job.status.as_str().to_string(),
            payload: job.payload.clone(),
            results: job.results.clone(),
            messages: job.messages.clone(),
            submission_version_id: job.submission_version_id.as_ref().map(|v| v.0.clone()),
            date_created: job.date_created,
            date_modified: job.date_modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionView {
    pub id: String,
    pub submission_id: String,
    pub status: String,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_transition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SubmissionVersion> for VersionView {
    fn from(version: &SubmissionVersion) -> Self {
        Self {
            id: version.id.0.clone(),
            submission_id: version.submission_id.0.clone(),
            status: version.status.clone(),
            metadata: version.metadata.clone(),
            pending_transition: version.pending_transition.clone(),
            published_at: version.published_at,
            revision: version.revision,
            created_at: version.created_at,
            updated_at: version.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub job_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub submission_version_id: Option<String>,
}

/// Body of the completion callback. Everything optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobPatchBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub results: Option<serde_json::Value>,
    #[serde(default)]
    pub submission_version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target: String,
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusWriteRequest {
    pub status: String,
    /// Acting user recorded for audit; authority comes from the handshake.
    #[serde(default)]
    pub user_id: Option<String>,
}

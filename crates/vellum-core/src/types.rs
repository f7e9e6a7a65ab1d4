//! Core records of the submission pipeline: jobs and submission versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubmissionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(pub String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub String);

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a job. Completed and Failed are terminal: once a job
/// reaches either, no further status writes are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!(
                "invalid job status '{other}'. valid values: pending, running, completed, failed"
            )),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of asynchronous work a job performs.
///
/// Core types are closed variants; anything else is an extension type whose
/// name must be registered with the handler registry before the engine
/// starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobType {
    /// Run the configured validation checks against a submission version.
    Check,
    /// Ad hoc run of every registered check implementation.
    CliCheck,
    /// Push a submission version to the public site.
    Publish,
    /// Retract a previously published submission version.
    Unpublish,
    /// A job type contributed by an extension registration.
    Extension(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::Check => "check",
            JobType::CliCheck => "cli_check",
            JobType::Publish => "publish",
            JobType::Unpublish => "unpublish",
            JobType::Extension(name) => name.as_str(),
        }
    }

    /// Core job types that need a storage backend handle at dispatch time.
    pub fn core_requires_storage(&self) -> bool {
        matches!(self, JobType::Publish | JobType::Unpublish)
    }

    /// Every name parses; unknown names become extension types.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "check" => JobType::Check,
            "cli_check" => JobType::CliCheck,
            "publish" => JobType::Publish,
            "unpublish" => JobType::Unpublish,
            other => JobType::Extension(other.to_string()),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(JobType::parse(value))
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(JobType::parse(&raw))
    }
}

/// A tracked unit of asynchronous, externally-executed work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub results: serde_json::Value,
    #[serde(default)]
    pub messages: Vec<String>,
    /// Submission version this job gates, when the job was created for a
    /// deferred transition.
    #[serde(default)]
    pub submission_version_id: Option<VersionId>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, job_type: JobType, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            payload,
            results: serde_json::Value::Null,
            messages: Vec::new(),
            submission_version_id: None,
            date_created: now,
            date_modified: now,
        }
    }

    pub fn with_version(mut self, version_id: VersionId) -> Self {
        self.submission_version_id = Some(version_id);
        self
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.date_modified = Utc::now();
    }

    pub fn mark_completed(&mut self, results: serde_json::Value) {
        self.status = JobStatus::Completed;
        self.results = results;
        self.date_modified = Utc::now();
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.messages.push(message.into());
        self.date_modified = Utc::now();
    }
}

/// One revision of a submission moving through an editorial workflow.
///
/// `status` is always a state name of the workflow resolved for the
/// submission's collection. While a job-gated transition is outstanding,
/// `status` keeps the source state and `pending_transition` names the
/// in-flight transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionVersion {
    pub id: VersionId,
    pub submission_id: SubmissionId,
    pub status: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub pending_transition: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Monotonic counter used as the optimistic-concurrency token. Bumped on
    /// every successful write; conditional updates compare against it rather
    /// than against timestamps.
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionVersion {
    pub fn new(id: VersionId, submission_id: SubmissionId, initial_status: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            submission_id,
            status: initial_status.into(),
            metadata: serde_json::json!({}),
            pending_transition: None,
            published_at: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending_transition.is_some()
    }
}

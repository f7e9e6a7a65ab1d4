//! Request and check contexts passed by reference into the engine.

use std::collections::BTreeSet;

/// Caller identity for one engine call. Constructed by the HTTP layer (or a
/// test) from whatever authentication it performed; the engine only reads
/// scopes and the trusted flag.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub scopes: BTreeSet<String>,
    /// Trusted service callers bypass handshake verification on the job
    /// completion path (e.g. an operator patching a stuck job).
    pub trusted: bool,
}

impl RequestContext {
    pub fn trusted_service() -> Self {
        Self {
            user_id: None,
            scopes: BTreeSet::new(),
            trusted: true,
        }
    }

    pub fn user(user_id: impl Into<String>, scopes: impl IntoIterator<Item = String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            scopes: scopes.into_iter().collect(),
            trusted: false,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    pub fn missing_scopes(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|scope| !self.has_scope(scope))
            .cloned()
            .collect()
    }
}

/// Read-only context handed to check implementations. Checks share nothing
/// mutable; each gets the same snapshot of the version under review.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub submission_version_id: Option<vellum_core::types::VersionId>,
    pub metadata: serde_json::Value,
}

impl CheckContext {
    pub fn for_version(version: &vellum_core::types::SubmissionVersion) -> Self {
        Self {
            submission_version_id: Some(version.id.clone()),
            metadata: version.metadata.clone(),
        }
    }

    pub fn ad_hoc(metadata: serde_json::Value) -> Self {
        Self {
            submission_version_id: None,
            metadata,
        }
    }
}

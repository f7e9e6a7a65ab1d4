//! Check results and the compiled report produced by the check runner.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Error,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "fail",
            CheckStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position inside a checked file, when the check can point at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPosition {
    pub line: u64,
    pub column: Option<u64>,
}

/// One finding from a check implementation. An implementation may produce
/// zero, one, or many of these (e.g. one per broken link found).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub position: Option<CheckPosition>,
    /// Another check id whose failure explains this one, used to avoid
    /// duplicate noise when a prerequisite already failed.
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl CheckResult {
    pub fn pass(check_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(check_id, CheckStatus::Pass, message)
    }

    pub fn fail(check_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(check_id, CheckStatus::Fail, message)
    }

    pub fn error(check_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(check_id, CheckStatus::Error, message)
    }

    fn with_status(
        check_id: impl Into<String>,
        status: CheckStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check_id: check_id.into(),
            status,
            message: message.into(),
            file: None,
            position: None,
            cause: None,
            optional: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

/// Aggregated output of one check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledReport {
    pub results: Vec<CheckResult>,
    pub summary: CheckSummary,
}

impl CompiledReport {
    /// Compile a report from raw results, counting each result into the
    /// summary bucket matching its status.
    pub fn compile(results: Vec<CheckResult>) -> Self {
        let mut summary = CheckSummary::default();
        for result in &results {
            match result.status {
                CheckStatus::Pass => summary.passed += 1,
                CheckStatus::Fail => summary.failed += 1,
                CheckStatus::Error => summary.errored += 1,
            }
        }
        Self { results, summary }
    }

    /// A run succeeds when no required check failed or errored. Optional
    /// checks may fail without blocking.
    pub fn success(&self) -> bool {
        self.results
            .iter()
            .all(|result| result.status == CheckStatus::Pass || result.optional)
    }
}

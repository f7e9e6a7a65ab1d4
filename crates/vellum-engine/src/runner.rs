//! Bounded-concurrency check runner.
//!
//! Check implementations run as spawned tasks gated by a semaphore. A
//! failing or panicking implementation contributes a single error result
//! for its check id; it never aborts the rest of the run.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use vellum_core::checks::{CheckResult, CompiledReport};

use crate::context::CheckContext;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("check execution failed: {message}")]
    Execution { message: String },
}

impl CheckError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

/// A single validation check. One implementation may report any number of
/// results, e.g. one per broken link found.
#[async_trait]
pub trait CheckImplementation: Send + Sync {
    fn id(&self) -> &str;

    /// Optional checks may fail without blocking the run.
    fn optional(&self) -> bool {
        false
    }

    async fn validate(&self, ctx: &CheckContext) -> Result<Vec<CheckResult>, CheckError>;
}

/// Runs the selected checks with at most `limit` in flight at once.
///
/// An empty `check_ids` runs every registered implementation. A requested
/// id with no matching implementation produces an error result rather than
/// being silently skipped.
pub async fn run_checks(
    ctx: &CheckContext,
    check_ids: &[String],
    implementations: &[Arc<dyn CheckImplementation>],
    limit: usize,
) -> CompiledReport {
    let mut selected: Vec<Arc<dyn CheckImplementation>> = Vec::new();
    let mut results: Vec<CheckResult> = Vec::new();

    if check_ids.is_empty() {
        selected.extend(implementations.iter().cloned());
    } else {
        for id in check_ids {
            match implementations.iter().find(|imp| imp.id() == id) {
                Some(imp) => selected.push(Arc::clone(imp)),
                None => results.push(CheckResult::error(id.clone(), "no such check")),
            }
        }
    }

    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut handles = Vec::with_capacity(selected.len());
    for imp in selected {
        let id = imp.id().to_string();
        let optional = imp.optional();
        let ctx = ctx.clone();
        let semaphore = Arc::clone(&semaphore);
        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("check semaphore closed");
            imp.validate(&ctx).await
        });
        handles.push((id, optional, handle));
    }

    for (id, optional, handle) in handles {
        match handle.await {
            Ok(Ok(batch)) => results.extend(batch),
            Ok(Err(err)) => {
                tracing::warn!(check_id = %id, error = %err, "check failed to execute");
                let mut result = CheckResult::error(&id, err.to_string());
                result.optional = optional;
                results.push(result);
            }
            Err(join_err) => {
                tracing::warn!(check_id = %id, "check task aborted");
                let mut result =
                    CheckResult::error(&id, format!("check task aborted: {join_err}"));
                result.optional = optional;
                results.push(result);
            }
        }
    }

    CompiledReport::compile(results)
}

//! Optimistic-concurrency guard for shared JSON metadata.
//!
//! Writers never clobber each other: every retry re-reads the freshest
//! record and reapplies the mutation on top of it, so a lost race costs a
//! retry, not data.

use vellum_core::types::{SubmissionVersion, VersionId};

use crate::error::EngineError;
use crate::store::{VersionStore, WriteOutcome};

/// Applies `update_fn` to a version's metadata under revision guard.
///
/// On conflict the update is retried from a fresh read, up to `max_retries`
/// extra attempts, then fails with `ConcurrentModification` (retryable).
pub fn safe_json_update<F>(
    versions: &dyn VersionStore,
    version_id: &VersionId,
    max_retries: u32,
    update_fn: F,
) -> Result<SubmissionVersion, EngineError>
where
    F: Fn(&mut serde_json::Value),
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let version =
            versions
                .get_version(version_id)?
                .ok_or_else(|| EngineError::NotFound {
                    resource: format!("submission version '{version_id}'"),
                })?;
        let expected = version.revision;

        let mut next = version;
        update_fn(&mut next.metadata);

        match versions.update_version(&next, expected)? {
            WriteOutcome::Applied => {
                if attempts > 1 {
                    tracing::debug!(version_id = %version_id, attempts, "metadata write landed after retry");
                }
                return versions
                    .get_version(version_id)?
                    .ok_or_else(|| EngineError::NotFound {
                        resource: format!("submission version '{version_id}'"),
                    });
            }
            WriteOutcome::Conflict => {
                if attempts > max_retries {
                    tracing::warn!(version_id = %version_id, attempts, "metadata write gave up");
                    return Err(EngineError::ConcurrentModification { attempts });
                }
            }
            WriteOutcome::Missing => {
                return Err(EngineError::NotFound {
                    resource: format!("submission version '{version_id}'"),
                });
            }
        }
    }
}

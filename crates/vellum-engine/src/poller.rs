//! Client-side job poller.
//!
//! Polls a job resource at a fixed interval until the job reaches a
//! terminal state, a custom stop predicate fires, or fetching fails too
//! many times in a row. Exactly one outcome is returned; a transient fetch
//! failure resets once a fetch succeeds again.

use std::time::Duration;

use async_trait::async_trait;

use vellum_core::types::{Job, JobId};

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("job fetch failed {failures} consecutive times: {last}")]
    FetchExhausted { failures: u32, last: String },
}

#[async_trait]
pub trait JobFetcher: Send + Sync {
    async fn fetch(&self, job_id: &JobId) -> Result<Job, FetchError>;
}

pub struct PollOptions {
    pub interval: Duration,
    pub max_fetch_failures: u32,
    /// Overrides the default stop condition (terminal job status).
    pub should_stop: Option<Box<dyn Fn(&Job) -> bool + Send + Sync>>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_fetch_failures: 5,
            should_stop: None,
        }
    }
}

pub async fn poll_job(
    fetcher: &dyn JobFetcher,
    job_id: &JobId,
    options: &PollOptions,
) -> Result<Job, PollError> {
    let mut consecutive_failures: u32 = 0;
    let mut last_error = String::new();

    loop {
        match fetcher.fetch(job_id).await {
            Ok(job) => {
                consecutive_failures = 0;
                let stop = match &options.should_stop {
                    Some(predicate) => predicate(&job),
                    None => job.status.is_terminal(),
                };
                if stop {
                    return Ok(job);
                }
            }
            Err(err) => {
                consecutive_failures += 1;
                last_error = err.to_string();
                tracing::debug!(
                    job_id = %job_id,
                    consecutive_failures,
                    "job fetch failed"
                );
                if consecutive_failures >= options.max_fetch_failures.max(1) {
                    return Err(PollError::FetchExhausted {
                        failures: consecutive_failures,
                        last: last_error,
                    });
                }
            }
        }
        tokio::time::sleep(options.interval).await;
    }
}

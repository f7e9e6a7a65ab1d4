//! Outbound job dispatch.
//!
//! Jobs are executed by external workers; the engine only publishes a
//! message describing the work. The message carries everything a worker
//! needs: the job payload, the callback URL, and the handshake token it
//! must present when reporting completion.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use vellum_core::types::{JobId, JobType};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport publish failed: {message}")]
    PublishFailed { message: String },
}

/// Message handed to an external worker when a job is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub job_type: JobType,
    /// Signed token the worker presents on the completion callback.
    pub handshake: String,
    /// Callback URL for status reads and the completion PATCH.
    pub job_url: String,
    pub payload: serde_json::Value,
}

pub trait MessageTransport: Send + Sync {
    fn publish(&self, message: &JobMessage) -> Result<(), TransportError>;
}

/// Logs dispatched jobs without delivering them anywhere. Useful as a
/// default in single-process deployments where workers tail the log.
#[derive(Debug, Clone, Default)]
pub struct StdoutTransport;

impl MessageTransport for StdoutTransport {
    fn publish(&self, message: &JobMessage) -> Result<(), TransportError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| TransportError::PublishFailed {
                message: format!("serialize job message: {e}"),
            })?;
        tracing::info!(
            job_id = %message.job_id,
            job_type = %message.job_type,
            "dispatching job"
        );
        println!("{payload}");
        Ok(())
    }
}

/// Captures published messages in memory.
#[derive(Debug, Default)]
pub struct CaptureTransport {
    messages: Mutex<Vec<JobMessage>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<JobMessage> {
        self.messages.lock().expect("transport lock").clone()
    }
}

impl MessageTransport for CaptureTransport {
    fn publish(&self, message: &JobMessage) -> Result<(), TransportError> {
        self.messages
            .lock()
            .expect("transport lock")
            .push(message.clone());
        Ok(())
    }
}

/// Rejects every publish. Test double for dispatch-failure paths.
#[derive(Debug, Clone, Default)]
pub struct RejectingTransport;

impl MessageTransport for RejectingTransport {
    fn publish(&self, _message: &JobMessage) -> Result<(), TransportError> {
        Err(TransportError::PublishFailed {
            message: "transport unavailable".to_string(),
        })
    }
}

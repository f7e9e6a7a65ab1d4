//! Orchestration engine for the submission pipeline: job creation and
//! dispatch, handshake trust boundary, transition execution, completion
//! callbacks, OCC-guarded metadata, and the check runner.

pub mod callback;
pub mod context;
pub mod error;
pub mod handlers;
pub mod occ;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod runner;
pub mod sqlite;
pub mod storage;
pub mod store;
pub mod token;
pub mod transition;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use callback::{CompletionHandler, JobPatch};
pub use context::{CheckContext, RequestContext};
pub use error::{EngineError, StoreError};
pub use occ::safe_json_update;
pub use orchestrator::{JobCreateRequest, JobOrchestrator};
pub use poller::{poll_job, FetchError, JobFetcher, PollError, PollOptions};
pub use registry::{DispatchEnv, HandlerRegistry, JobHandler, RegistryError};
pub use runner::{run_checks, CheckError, CheckImplementation};
pub use sqlite::SqliteStore;
pub use storage::{MemoryStorage, StorageBackend, StorageError, StorageFactory};
pub use store::{ActivityStore, JobStore, MemoryStore, VersionStore, WriteOutcome};
pub use token::{HandshakeClaims, TokenIssuer};
pub use transition::{TransitionExecutor, TransitionOutcome};
pub use transport::{CaptureTransport, JobMessage, MessageTransport, StdoutTransport, TransportError};

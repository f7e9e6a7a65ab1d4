//! Job handler registry.
//!
//! Job types dispatch through a closed table built at startup. Core types
//! are always present; extensions register under their own names before the
//! engine starts serving, so an unknown type is rejected eagerly instead of
//! failing deep inside dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use vellum_core::types::{Job, JobType};

use crate::context::RequestContext;
use crate::error::EngineError;
use crate::handlers::{CheckJobHandler, OutboundJobHandler};
use crate::runner::CheckImplementation;
use crate::storage::StorageBackend;
use crate::store::{JobStore, VersionStore};
use crate::transport::MessageTransport;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job type '{name}' is already registered")]
    DuplicateJobType { name: String },
    #[error("'{name}' is a reserved core job type")]
    CoreNameReserved { name: String },
}

/// Everything a handler may need at dispatch time. `storage` is populated
/// only when the handler's registration asks for it.
pub struct DispatchEnv {
    pub jobs: Arc<dyn JobStore>,
    pub versions: Arc<dyn VersionStore>,
    pub transport: Arc<dyn MessageTransport>,
    pub storage: Option<Arc<dyn StorageBackend>>,
    pub checks: Arc<Vec<Arc<dyn CheckImplementation>>>,
    pub check_limit: usize,
    /// Callback URL for this job, handed to external workers.
    pub job_url: String,
    /// Signed handshake token bound to this job.
    pub handshake: String,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Dispatches the job: persist it and either execute in process or hand
    /// it to an external worker via the transport.
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        job: &mut Job,
        env: &DispatchEnv,
    ) -> Result<(), EngineError>;
}

pub struct Registration {
    handler: Arc<dyn JobHandler>,
    requires_storage: bool,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("requires_storage", &self.requires_storage)
            .finish_non_exhaustive()
    }
}

impl Registration {
    pub fn handler(&self) -> &Arc<dyn JobHandler> {
        &self.handler
    }

    pub fn requires_storage(&self) -> bool {
        self.requires_storage
    }
}

pub struct HandlerRegistry {
    handlers: BTreeMap<String, Registration>,
}

const CORE_TYPES: &[JobType] = &[
    JobType::Check,
    JobType::CliCheck,
    JobType::Publish,
    JobType::Unpublish,
];

impl HandlerRegistry {
    /// Registry with the four core job types wired to their handlers.
    pub fn with_core_handlers() -> Self {
        let mut handlers = BTreeMap::new();
        for job_type in CORE_TYPES {
            let handler: Arc<dyn JobHandler> = match job_type {
                JobType::Check => Arc::new(CheckJobHandler::selected()),
                JobType::CliCheck => Arc::new(CheckJobHandler::run_all()),
                JobType::Publish | JobType::Unpublish => Arc::new(OutboundJobHandler),
                JobType::Extension(_) => unreachable!("core table holds no extensions"),
            };
            handlers.insert(
                job_type.as_str().to_string(),
                Registration {
                    handler,
                    requires_storage: job_type.core_requires_storage(),
                },
            );
        }
        Self { handlers }
    }

    /// Adds an extension job type. Rejected when the name collides with a
    /// core type or an earlier registration.
    pub fn register_extension(
        &mut self,
        name: impl Into<String>,
        requires_storage: bool,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if CORE_TYPES.iter().any(|t| t.as_str() == name) {
            return Err(RegistryError::CoreNameReserved { name });
        }
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateJobType { name });
        }
        self.handlers.insert(
            name,
            Registration {
                handler,
                requires_storage,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, job_type: &JobType) -> Result<&Registration, EngineError> {
        self.handlers
            .get(job_type.as_str())
            .ok_or_else(|| EngineError::UnknownJobType(job_type.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn registered_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn dispatch(
            &self,
            _ctx: &RequestContext,
            _job: &mut Job,
            _env: &DispatchEnv,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[test]
    fn core_registry_resolves_all_core_types() {
        let registry = HandlerRegistry::with_core_handlers();
        for job_type in CORE_TYPES {
            assert!(registry.resolve(job_type).is_ok(), "{job_type} missing");
        }
    }

    #[test]
    fn unregistered_extension_is_unknown() {
        let registry = HandlerRegistry::with_core_handlers();
        let err = registry
            .resolve(&JobType::Extension("datacite_deposit".to_string()))
            .expect_err("unknown");
        assert!(matches!(err, EngineError::UnknownJobType(_)));
    }

    #[test]
    fn extension_registration_makes_the_type_resolvable() {
        let mut registry = HandlerRegistry::with_core_handlers();
        registry
            .register_extension("datacite_deposit", true, Arc::new(NoopHandler))
            .expect("register");

        let registration = registry
            .resolve(&JobType::Extension("datacite_deposit".to_string()))
            .expect("resolve");
        assert!(registration.requires_storage());
    }

    #[test]
    fn core_names_cannot_be_shadowed() {
        let mut registry = HandlerRegistry::with_core_handlers();
        let err = registry
            .register_extension("publish", false, Arc::new(NoopHandler))
            .expect_err("reserved");
        assert!(matches!(err, RegistryError::CoreNameReserved { name } if name == "publish"));
    }

    #[test]
    fn duplicate_extension_names_are_rejected() {
        let mut registry = HandlerRegistry::with_core_handlers();
        registry
            .register_extension("datacite_deposit", false, Arc::new(NoopHandler))
            .expect("first");
        let err = registry
            .register_extension("datacite_deposit", false, Arc::new(NoopHandler))
            .expect_err("duplicate");
        assert!(matches!(err, RegistryError::DuplicateJobType { .. }));
    }

    #[test]
    fn storage_requirement_follows_the_core_table() {
        let registry = HandlerRegistry::with_core_handlers();
        assert!(registry
            .resolve(&JobType::Publish)
            .unwrap()
            .requires_storage());
        assert!(!registry.resolve(&JobType::Check).unwrap().requires_storage());
    }
}

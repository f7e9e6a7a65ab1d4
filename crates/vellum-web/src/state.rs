//! Shared application state handed to every route.

use std::sync::Arc;

use vellum_core::EngineConfig;
use vellum_engine::runner::CheckImplementation;
use vellum_engine::storage::StorageFactory;
use vellum_engine::store::{ActivityStore, JobStore, VersionStore};
use vellum_engine::transport::MessageTransport;
use vellum_engine::{
    CompletionHandler, HandlerRegistry, JobOrchestrator, TokenIssuer, TransitionExecutor,
};

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<TransitionExecutor>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub callback: Arc<CompletionHandler>,
    pub versions: Arc<dyn VersionStore>,
    pub config: Arc<EngineConfig>,
}

impl AppState {
    /// Composition root: wires the engine out of a validated config, the
    /// store adapters, the outbound transport, and the handshake secret.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        config: EngineConfig,
        jobs: Arc<dyn JobStore>,
        versions: Arc<dyn VersionStore>,
        activity: Arc<dyn ActivityStore>,
        transport: Arc<dyn MessageTransport>,
        storage_factory: StorageFactory,
        checks: Vec<Arc<dyn CheckImplementation>>,
        secret: &[u8],
    ) -> Self {
        let tokens = TokenIssuer::new(config.token.issuer.clone(), config.token.ttl_secs, secret);
        let orchestrator = Arc::new(JobOrchestrator::new(
            HandlerRegistry::with_core_handlers(),
            tokens.clone(),
            Arc::clone(&jobs),
            Arc::clone(&versions),
            transport,
            storage_factory,
            checks,
            config.jobs.check_concurrency,
            config.site.base_url.clone(),
        ));
        let executor = Arc::new(TransitionExecutor::new(
            Arc::clone(&versions),
            Arc::clone(&activity),
            Arc::clone(&orchestrator),
        ));
        let callback = Arc::new(CompletionHandler::new(tokens, jobs, Arc::clone(&versions), activity));

        Self {
            executor,
            orchestrator,
            callback,
            versions,
            config: Arc::new(config),
        }
    }
}

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use vellum_core::config::{load_engine_config, ConfigError};
use vellum_core::validation::{Validate, ValidationIssue, ValidationLevel};
use vellum_engine::storage::{MemoryStorage, StorageBackend};
use vellum_engine::{MemoryStore, SqliteStore, StdoutTransport, StoreError};
use vellum_web::{run_web_server, AppState, WebError};

const DEFAULT_CONFIG: &str = "config/vellum.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliArgs {
    config_path: PathBuf,
    bind_override: Option<String>,
    db_override: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Run(CliArgs),
    Help(String),
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("{0}")]
    Args(String),
    #[error("failed to load config at {path}: {source}")]
    LoadConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("{0}")]
    InvalidConfig(String),
    #[error("handshake secret not set: export {0}")]
    MissingSecret(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Web(#[from] WebError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("vellum-server failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), MainError> {
    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "vellum-server".to_string());
    let command = parse_cli_args(argv.collect::<Vec<_>>(), &program)?;
    let CliCommand::Run(args) = command else {
        let CliCommand::Help(text) = command else {
            unreachable!();
        };
        println!("{text}");
        return Ok(());
    };

    let config = load_engine_config(&args.config_path).map_err(|source| MainError::LoadConfig {
        path: args.config_path.clone(),
        source,
    })?;
    validate_config(&config.validate())?;

    let secret = env::var(&config.token.secret_env)
        .map_err(|_| MainError::MissingSecret(config.token.secret_env.clone()))?;

    let bind = resolve_bind(args.bind_override, &config.site.bind)?;
    let db_path = args.db_override.or_else(|| config.site.db_path.clone());

    let state = match &db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening sqlite store");
            let store = Arc::new(SqliteStore::open(path)?);
            assemble(config, store, secret.as_bytes())
        }
        None => {
            tracing::warn!("no database configured, state is in-memory only");
            let store = Arc::new(MemoryStore::new());
            assemble(config, store, secret.as_bytes())
        }
    };

    run_web_server(&bind, state).await?;
    Ok(())
}

fn assemble<S>(config: vellum_core::EngineConfig, store: Arc<S>, secret: &[u8]) -> AppState
where
    S: vellum_engine::JobStore + vellum_engine::VersionStore + vellum_engine::ActivityStore + 'static,
{
    AppState::assemble(
        config,
        store.clone(),
        store.clone(),
        store,
        Arc::new(StdoutTransport::default()),
        Arc::new(|| Ok(Arc::new(MemoryStorage::new()) as Arc<dyn StorageBackend>)),
        Vec::new(),
        secret,
    )
}

fn resolve_bind(bind_override: Option<String>, config_bind: &str) -> Result<String, MainError> {
    let candidate = bind_override.unwrap_or_else(|| config_bind.to_string());
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(MainError::Args(
            "bind address must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_config(issues: &[ValidationIssue]) -> Result<(), MainError> {
    let errors = issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Error)
        .collect::<Vec<_>>();
    if errors.is_empty() {
        return Ok(());
    }

    let rendered = errors
        .iter()
        .map(|issue| format!("{}: {}", issue.code, issue.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(MainError::InvalidConfig(format!(
        "config validation failed ({})",
        rendered
    )))
}

fn parse_cli_args(args: Vec<String>, program: &str) -> Result<CliCommand, MainError> {
    let mut parsed = CliArgs {
        config_path: PathBuf::from(DEFAULT_CONFIG),
        bind_override: None,
        db_override: None,
    };

    let mut idx = 0usize;
    while idx < args.len() {
        let arg = &args[idx];
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliCommand::Help(usage(program))),
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| MainError::Args("missing value for --config".to_string()))?;
                parsed.config_path = PathBuf::from(value);
            }
            "--bind" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| MainError::Args("missing value for --bind".to_string()))?;
                parsed.bind_override = Some(value.clone());
            }
            "--db" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| MainError::Args("missing value for --db".to_string()))?;
                parsed.db_override = Some(PathBuf::from(value));
            }
            other => {
                return Err(MainError::Args(format!(
                    "unknown argument: {other}\n\n{}",
                    usage(program)
                )));
            }
        }
        idx += 1;
    }

    Ok(CliCommand::Run(parsed))
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [--config <path>] [--bind <ip:port>] [--db <path>]\n\
Defaults:\n\
  --config {DEFAULT_CONFIG}\n\
  --bind from config.site.bind\n\
  --db from config.site.db_path (in-memory store when unset)"
    )
}

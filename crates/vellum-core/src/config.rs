//! Engine configuration: site, handshake token, job tuning, and the
//! workflow definitions a deployment runs with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::workflow::Workflow;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Address the HTTP server binds.
    pub bind: String,
    /// Public base URL used to build `job_url` callback targets.
    pub base_url: String,
    /// SQLite database file. When absent the server keeps state in memory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub issuer: String,
    pub ttl_secs: u64,
    /// Name of the environment variable holding the signing secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
}

fn default_secret_env() -> String {
    "VELLUM_HANDSHAKE_SECRET".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Upper bound on simultaneously in-flight check implementations.
    #[serde(default = "default_check_concurrency")]
    pub check_concurrency: usize,
    /// Retry budget for optimistic-concurrency metadata writes.
    #[serde(default = "default_occ_max_retries")]
    pub occ_max_retries: u32,
}

fn default_check_concurrency() -> usize {
    25
}

fn default_occ_max_retries() -> u32 {
    4
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            check_concurrency: default_check_concurrency(),
            occ_max_retries: default_occ_max_retries(),
        }
    }
}

/// Which workflow governs which submission collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSelection {
    /// Site default workflow name.
    pub default: String,
    /// Per-collection overrides.
    #[serde(default)]
    pub collections: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub site: SiteConfig,
    pub token: TokenConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    pub workflows: WorkflowSelection,
    #[serde(default)]
    pub workflow: Vec<Workflow>,
}

impl EngineConfig {
    pub fn workflow_named(&self, name: &str) -> Option<&Workflow> {
        self.workflow.iter().find(|w| w.name == name)
    }

    /// Resolve the workflow for a submission collection, falling back to the
    /// site default when the collection has no override.
    pub fn workflow_for_collection(&self, collection: Option<&str>) -> Option<&Workflow> {
        let name = collection
            .and_then(|c| self.workflows.collections.get(c))
            .map(String::as_str)
            .unwrap_or(self.workflows.default.as_str());
        self.workflow_named(name)
    }
}

pub fn parse_engine_config(contents: &str) -> Result<EngineConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_engine_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_engine_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

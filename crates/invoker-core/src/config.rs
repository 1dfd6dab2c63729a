use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, InvocationError};

/// Default size of the background jobs pool.
pub const DEFAULT_JOBS_POOL: usize = 10;
/// Prefix that routes a job's schedule value through the `[cron]` table.
pub const NAMED_EXPRESSION_PREFIX: &str = "cron.";

/// Application mode. Drives the default request pool size and whether
/// invocations may lazily start the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    #[serde(alias = "development")]
    Dev,
    #[serde(alias = "production")]
    Prod,
}

impl Mode {
    pub fn is_dev(&self) -> bool {
        matches!(self, Mode::Dev)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Dev => write!(f, "dev"),
            Mode::Prod => write!(f, "prod"),
        }
    }
}

/// Top-level config (invoker.toml + INVOKER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Named schedule values, referenced from job declarations as `cron.<name>`.
    /// Override with env var: INVOKER_CRON_<NAME>="0 0 2 * * ?"
    #[serde(default)]
    pub cron: HashMap<String, String>,
}

/// Request worker pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of concurrent request invocations. Unset means 1 in dev mode,
    /// cores + 1 in prod mode.
    pub size: Option<usize>,
}

/// Background jobs pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_jobs_pool")]
    pub pool: usize,
    /// Cadence of the host's status report job (`jobs.report`, INVOKER_JOBS_REPORT); "never" disables it.
    #[serde(default = "default_report")]
    pub report: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            pool: DEFAULT_JOBS_POOL,
            report: default_report(),
        }
    }
}

fn default_jobs_pool() -> usize {
    DEFAULT_JOBS_POOL
}
fn default_report() -> String {
    "never".to_string()
}

impl EngineConfig {
    /// Load config from a TOML file with INVOKER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.invoker/invoker.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("INVOKER_").split("_")),
        )
    }

    /// Extract from an already assembled figment.
    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment.extract().map_err(|e| {
            InvocationError::Domain(DomainError::new("Configuration error", e.to_string()))
        })
    }

    /// Effective request pool size for the configured mode.
    pub fn pool_size(&self) -> usize {
        match self.pool.size {
            Some(n) => n.max(1),
            None if self.mode.is_dev() => 1,
            None => available_cores() + 1,
        }
    }

    pub fn jobs_pool_size(&self) -> usize {
        self.jobs.pool.max(1)
    }

    /// Resolve a schedule value, following `cron.<name>` references into the
    /// `[cron]` table. Returns `None` for an unknown reference.
    pub fn resolve_schedule(&self, value: &str) -> Option<String> {
        match value.strip_prefix(NAMED_EXPRESSION_PREFIX) {
            Some(name) => self.cron.get(name).cloned(),
            None => Some(value.to_string()),
        }
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.invoker/invoker.toml", home)
}

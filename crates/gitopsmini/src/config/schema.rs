use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log output format for the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

pub const DEFAULT_AUTO_SYNC_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CLUSTER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RUN_LEASE_SECS: u64 = 3600;
pub const DEFAULT_GIT_TOKEN_ENV_VAR: &str = "GITOPSMINI_GIT_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Period between auto-sync sweeps.
    pub auto_sync_interval_ms: u64,
    /// Parent directory of per-application working copies.
    pub repos_dir: PathBuf,
    pub database_path: PathBuf,
    pub git_timeout_secs: u64,
    pub cluster_timeout_secs: u64,
    /// How long a run claim outlives a process that died mid-run.
    pub run_lease_secs: u64,
    pub log_format: LogFormat,
    /// Environment variable holding the git access token, if any.
    pub git_token_env_var: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".gitopsmini"))
            .unwrap_or_else(|| PathBuf::from(".gitopsmini"));

        Self {
            auto_sync_interval_ms: DEFAULT_AUTO_SYNC_INTERVAL_MS,
            repos_dir: base.join("repos"),
            database_path: crate::db::default_database_path()
                .unwrap_or_else(|| base.join("data").join("gitopsmini.db")),
            git_timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
            cluster_timeout_secs: DEFAULT_CLUSTER_TIMEOUT_SECS,
            run_lease_secs: DEFAULT_RUN_LEASE_SECS,
            log_format: LogFormat::Text,
            git_token_env_var: DEFAULT_GIT_TOKEN_ENV_VAR.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_millis(self.auto_sync_interval_ms)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn cluster_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster_timeout_secs)
    }

    pub fn run_lease(&self) -> Duration {
        Duration::from_secs(self.run_lease_secs)
    }
}

use std::path::{Path, PathBuf};

use crate::config::schema::{EngineConfig, LogFormat};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/engine-config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: EngineConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads the optional config file, then applies environment overrides.
pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;

    Ok(config)
}

/// Applies `AUTO_SYNC_INTERVAL_MS` and the `GITOPSMINI_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut EngineConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &'static str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| (name, v))
    };

    if let Some((name, value)) = get("AUTO_SYNC_INTERVAL_MS") {
        config.auto_sync_interval_ms = parse_number(name, value)?;
    }
    if let Some((_, value)) = get("GITOPSMINI_REPOS_DIR") {
        config.repos_dir = PathBuf::from(value);
    }
    if let Some((_, value)) = get("GITOPSMINI_DB") {
        config.database_path = PathBuf::from(value);
    }
    if let Some((name, value)) = get("GITOPSMINI_GIT_TIMEOUT_SECS") {
        config.git_timeout_secs = parse_number(name, value)?;
    }
    if let Some((name, value)) = get("GITOPSMINI_CLUSTER_TIMEOUT_SECS") {
        config.cluster_timeout_secs = parse_number(name, value)?;
    }
    if let Some((name, value)) = get("GITOPSMINI_RUN_LEASE_SECS") {
        config.run_lease_secs = parse_number(name, value)?;
    }
    if let Some((name, value)) = get("GITOPSMINI_LOG_FORMAT") {
        config.log_format = value
            .parse::<LogFormat>()
            .map_err(|_| ConfigError::InvalidEnv { name, value })?;
    }

    Ok(())
}

fn parse_number(name: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.auto_sync_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "autoSyncIntervalMs must be greater than zero".to_string(),
        });
    }
    if config.git_timeout_secs == 0 || config.cluster_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "timeouts must be greater than zero".to_string(),
        });
    }
    if config.run_lease_secs == 0 {
        return Err(ConfigError::Validation {
            message: "runLeaseSecs must be greater than zero".to_string(),
        });
    }
    if config.repos_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "reposDir must not be empty".to_string(),
        });
    }

    Ok(())
}

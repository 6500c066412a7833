// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::env;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// Environment variable naming the config file path; falls back to [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_VAR: &str = "JUDGE_WORKER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./judge-worker.toml";

/// Worker process configuration (§6 CLI surface, §10 ambient stack).
///
/// Loaded from an optional TOML file, then overridden field-by-field by identically-named
/// uppercase environment variables. Environment wins over file; file wins over the built-in
/// defaults below.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub login_url: String,
    pub websocket_url: String,
    #[serde(default = "default_parallel_judge_tasks")]
    pub parallel_judge_tasks: usize,
    #[serde(default = "default_log_limit_bytes")]
    pub log_limit_bytes: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_parallel_judge_tasks() -> usize {
    num_cpus::get()
}

fn default_log_limit_bytes() -> usize {
    1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        ConfigError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Loads configuration from `config_path` (if it exists) and layers environment overrides on
    /// top. A missing file is not an error -- the environment alone may supply every field.
    pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
        let mut raw = toml::Table::new();
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::new(format!("Failed to read {}: {e}", config_path.display())))?;
            raw = contents
                .parse::<toml::Table>()
                .map_err(|e| ConfigError::new(format!("Invalid TOML in {}: {e}", config_path.display())))?;
        }

        for key in [
            "username",
            "password",
            "login_url",
            "websocket_url",
            "parallel_judge_tasks",
            "log_limit_bytes",
            "log_level",
        ] {
            if let Ok(value) = env::var(key.to_uppercase()) {
                raw.insert(key.to_string(), env_value(key, &value));
            }
        }

        toml::Value::Table(raw)
            .try_into()
            .map_err(|e| ConfigError::new(format!("Invalid configuration: {e}")))
    }

    /// Resolves the config file path: `--config` flag, then [`CONFIG_PATH_VAR`], then the default.
    pub fn resolve_path(cli_override: Option<&Path>) -> std::path::PathBuf {
        if let Some(path) = cli_override {
            return path.to_path_buf();
        }
        env::var(CONFIG_PATH_VAR)
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

/// Environment variables arrive as strings; the numeric fields need parsing before they fit the
/// TOML table we merge them into.
fn env_value(key: &str, raw: &str) -> toml::Value {
    match key {
        "parallel_judge_tasks" | "log_limit_bytes" => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .unwrap_or_else(|_| toml::Value::String(raw.to_string())),
        _ => toml::Value::String(raw.to_string()),
    }
}

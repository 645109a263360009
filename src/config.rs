use std::path::PathBuf;

use crate::constants::{
    DEFAULT_BOOTSTRAP_TIMEOUT_MS, DEFAULT_CASE_TIMEOUT_MS, DEFAULT_MEMORY_LIMIT_BYTES,
    DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_PIDS_COUNT, DEFAULT_WORK_DIR_NAME,
};
use crate::core::domain::ExecutionLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub node_path: PathBuf,
    pub python_path: PathBuf,
    pub work_dir: PathBuf,
    pub case_timeout_ms: u64,
    pub memory_limit_bytes: u64,
    pub output_limit_bytes: u64,
    pub max_processes: u64,
    pub bootstrap_timeout_ms: u64,
}

impl HarnessConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: PathBuf| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };
        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(value) => match value.trim().parse::<u64>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ConfigError::InvalidValue {
                        key,
                        value,
                        expected: "a positive integer",
                    }),
                },
            }
        };

        Ok(Self {
            node_path: path("HARNESS_NODE_BIN", PathBuf::from("node")),
            python_path: path("HARNESS_PYTHON_BIN", PathBuf::from("python3")),
            work_dir: path(
                "HARNESS_WORK_DIR",
                std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME),
            ),
            case_timeout_ms: number("HARNESS_CASE_TIMEOUT_MS", DEFAULT_CASE_TIMEOUT_MS)?,
            memory_limit_bytes: number("HARNESS_MEMORY_LIMIT_BYTES", DEFAULT_MEMORY_LIMIT_BYTES)?,
            output_limit_bytes: number("HARNESS_OUTPUT_LIMIT_BYTES", DEFAULT_OUTPUT_LIMIT_BYTES)?,
            max_processes: number("HARNESS_MAX_PROCESSES", DEFAULT_PIDS_COUNT)?,
            bootstrap_timeout_ms: number(
                "HARNESS_BOOTSTRAP_TIMEOUT_MS",
                DEFAULT_BOOTSTRAP_TIMEOUT_MS,
            )?,
        })
    }

    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_ms: self.case_timeout_ms,
            memory_bytes: Some(self.memory_limit_bytes),
            output_size_bytes: Some(self.output_limit_bytes),
            pids_count: Some(self.max_processes),
        }
    }
}

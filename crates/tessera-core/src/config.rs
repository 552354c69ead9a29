//! Evaluation tuning
//!
//! Resolved once per process from the environment:
//!
//! | variable                     | default | meaning                                   |
//! |------------------------------|---------|-------------------------------------------|
//! | `TESSERA_PARALLEL_THRESHOLD` | 10000   | elements before the transfer goes parallel |
//! | `TESSERA_CHUNK_SIZE`         | 1024    | elements per transfer chunk               |
//! | `TESSERA_DEVICE_OFFLOAD`     | `true`  | run device-resident compound assignments on the device |

use std::str::FromStr;
use std::sync::OnceLock;

/// Minimum number of elements for parallel execution
pub const PARALLEL_THRESHOLD: usize = 10_000;

/// Elements moved per load/store batch
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Evaluation settings for assignment statements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalConfig {
    pub parallel_threshold: usize,
    pub chunk_size: usize,
    pub device_offload: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: PARALLEL_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            device_offload: true,
        }
    }
}

static GLOBAL_CONFIG: OnceLock<EvalConfig> = OnceLock::new();

impl EvalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TESSERA_*` environment variables
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            parallel_threshold: env_or("TESSERA_PARALLEL_THRESHOLD", defaults.parallel_threshold),
            chunk_size: env_or("TESSERA_CHUNK_SIZE", defaults.chunk_size).max(1),
            device_offload: env_or("TESSERA_DEVICE_OFFLOAD", defaults.device_offload),
        }
    }

    /// Process-wide configuration, read from the environment on first use
    pub fn global() -> &'static EvalConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            let config = Self::from_env();
            tracing::debug!(?config, "eval_config_resolved");
            config
        })
    }

    pub fn with_parallel_threshold(mut self, elements: usize) -> Self {
        self.parallel_threshold = elements;
        self
    }

    pub fn with_chunk_size(mut self, elements: usize) -> Self {
        self.chunk_size = elements.max(1);
        self
    }

    pub fn with_device_offload(mut self, enabled: bool) -> Self {
        self.device_offload = enabled;
        self
    }
}

fn env_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(variable = name, %value, "ignoring invalid value");
                default
            }
        },
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in ["TESSERA_PARALLEL_THRESHOLD", "TESSERA_CHUNK_SIZE", "TESSERA_DEVICE_OFFLOAD"] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        assert_eq!(EvalConfig::from_env(), EvalConfig::default());
        assert_eq!(EvalConfig::default().parallel_threshold, 10_000);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("TESSERA_PARALLEL_THRESHOLD", "64");
        std::env::set_var("TESSERA_CHUNK_SIZE", "0");
        std::env::set_var("TESSERA_DEVICE_OFFLOAD", "false");

        let config = EvalConfig::from_env();
        assert_eq!(config.parallel_threshold, 64);
        assert_eq!(config.chunk_size, 1);
        assert!(!config.device_offload);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("TESSERA_CHUNK_SIZE", "lots");
        assert_eq!(EvalConfig::from_env().chunk_size, DEFAULT_CHUNK_SIZE);
        clear_env();
    }

    #[test]
    fn test_builders() {
        let config = EvalConfig::new()
            .with_parallel_threshold(1)
            .with_chunk_size(0)
            .with_device_offload(false);
        assert_eq!(config.parallel_threshold, 1);
        assert_eq!(config.chunk_size, 1);
        assert!(!config.device_offload);
    }
}

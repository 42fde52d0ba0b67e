/// Configuration management for the Loopway engine
///
/// Handles server configuration, the data directory and runtime limits.

use crate::eval::Limits;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Engine and evaluator limits
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding workflows.db (default: "data")
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard cap on loop expansions per run
    pub max_expansions: usize,
    /// Evaluator call depth limit
    pub eval_max_depth: usize,
    /// Longest string or sequence an expression may build
    pub eval_max_len: usize,
    /// Evaluation steps allowed per expression
    pub eval_max_steps: u64,
}

impl EngineConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_depth: self.eval_max_depth,
            max_len: self.eval_max_len,
            max_steps: self.eval_max_steps,
        }
    }
}

/// Read `name`, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️ Ignoring unparsable {}={}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("LOOPWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("LOOPWAY_PORT", 3004),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("LOOPWAY_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            },
            engine: EngineConfig {
                max_expansions: env_or("LOOPWAY_MAX_EXPANSIONS", 10_000),
                eval_max_depth: env_or("LOOPWAY_EVAL_MAX_DEPTH", 64),
                eval_max_len: env_or("LOOPWAY_EVAL_MAX_LEN", 1_000_000),
                eval_max_steps: env_or("LOOPWAY_EVAL_MAX_STEPS", 5_000_000),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("LOOPWAY_TEST_GARBAGE_PORT", "not-a-port");
        assert_eq!(env_or("LOOPWAY_TEST_GARBAGE_PORT", 3004u16), 3004);
        std::env::set_var("LOOPWAY_TEST_GOOD_PORT", "8080");
        assert_eq!(env_or("LOOPWAY_TEST_GOOD_PORT", 3004u16), 8080);
        assert_eq!(env_or("LOOPWAY_TEST_UNSET_VALUE", 7usize), 7);
    }

    #[test]
    fn test_limits_follow_engine_config() {
        let engine = EngineConfig { max_expansions: 5, eval_max_depth: 8, eval_max_len: 100, eval_max_steps: 42 };
        let limits = engine.limits();
        assert_eq!(limits.max_depth, 8);
        assert_eq!(limits.max_len, 100);
        assert_eq!(limits.max_steps, 42);
    }
}

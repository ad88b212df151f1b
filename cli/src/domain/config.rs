//! Domain types for microdeploy configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

/// Environment variable controlling whether the CPI runs with a scrubbed environment.
pub const ISOLATED_ENV_VAR: &str = "BOSH_CPI_USE_ISOLATED_ENV";

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.microdeploy/config.yaml`.
///
/// Every field has a default, so an empty or missing file is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    pub retry: RetryConfig,
    pub cpi: CpiConfig,
    pub disks: DiskConfig,
}

/// Agent polling cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// How long to wait for a freshly created VM's agent to answer.
    pub ping_timeout_secs: u64,
    pub ping_delay_ms: u64,
    /// How long to wait for an existing VM's agent before skipping graceful shutdown.
    pub delete_ping_timeout_secs: u64,
    pub delete_ping_delay_ms: u64,
    /// Delay between `get_state` attempts while waiting for the job to run.
    pub get_state_delay_ms: u64,
    /// Delay between `get_task` polls for asynchronous agent tasks.
    pub task_poll_delay_ms: u64,
    /// `get_task` polls before an agent task is given up on.
    pub task_poll_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            ping_timeout_secs: 600,
            ping_delay_ms: 500,
            delete_ping_timeout_secs: 10,
            delete_ping_delay_ms: 500,
            get_state_delay_ms: 1000,
            task_poll_delay_ms: 500,
            task_poll_attempts: 600,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    #[must_use]
    pub fn ping_delay(&self) -> Duration {
        Duration::from_millis(self.ping_delay_ms)
    }

    #[must_use]
    pub fn delete_ping_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_ping_timeout_secs)
    }

    #[must_use]
    pub fn delete_ping_delay(&self) -> Duration {
        Duration::from_millis(self.delete_ping_delay_ms)
    }

    #[must_use]
    pub fn get_state_delay(&self) -> Duration {
        Duration::from_millis(self.get_state_delay_ms)
    }

    #[must_use]
    pub fn task_poll_delay(&self) -> Duration {
        Duration::from_millis(self.task_poll_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpiConfig {
    /// Upper bound on a single CPI invocation.
    pub command_timeout_secs: u64,
}

impl Default for CpiConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 3600,
        }
    }
}

impl CpiConfig {
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Unused disks tolerated before a migration must clean up first.
    pub max_unused: usize,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self { max_unused: 3 }
    }
}

// ── Parsers ──────────────────────────────────────────────────────────────────

/// Parse a boolean the way the CPI ecosystem writes them in environment variables.
///
/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`; anything
/// else is `None`.
#[must_use]
pub fn parse_env_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Whether the CPI should run with an isolated environment. Unset means isolated.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBool`] if the value is set but not a boolean.
pub fn use_isolated_env(raw: Option<&str>) -> Result<bool, ConfigError> {
    match raw {
        None => Ok(true),
        Some(value) => parse_env_bool(value).ok_or_else(|| ConfigError::InvalidBool {
            name: ISOLATED_ENV_VAR.to_string(),
            value: value.to_string(),
        }),
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────

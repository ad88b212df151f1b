//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::time::Duration;

use microdeploy_common::CpiErrorPayload;
use thiserror::Error;

use crate::domain::cpi::CpiErrorKind;
use crate::domain::vm::VmState;

// ── CPI errors ────────────────────────────────────────────────────────────────

/// Failure of a single CPI call.
///
/// `Transport` and `ResponseUnmarshalling` mean the exchange itself broke;
/// `Cpi` means the plugin answered and reported a domain failure.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Executing external CPI command for method '{method}': {message}")]
    Transport { method: String, message: String },

    #[error("CPI '{method}' method responded with error: {payload}")]
    Cpi {
        method: String,
        kind: CpiErrorKind,
        payload: CpiErrorPayload,
    },

    #[error("Unmarshalling CPI '{method}' response: {reason}")]
    ResponseUnmarshalling { method: String, reason: String },
}

impl CloudError {
    /// Classified error kind, present only for protocol-domain errors.
    #[must_use]
    pub fn kind(&self) -> Option<CpiErrorKind> {
        match self {
            Self::Cpi { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_vm_not_found(&self) -> bool {
        self.kind() == Some(CpiErrorKind::VmNotFound)
    }

    #[must_use]
    pub fn is_disk_not_found(&self) -> bool {
        self.kind() == Some(CpiErrorKind::DiskNotFound)
    }

    #[must_use]
    pub fn is_stemcell_not_found(&self) -> bool {
        self.kind() == Some(CpiErrorKind::StemcellNotFound)
    }

    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        self.kind() == Some(CpiErrorKind::NotImplemented)
    }
}

// ── Agent errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Sending '{method}' to the agent: {message}")]
    Transport { method: String, message: String },

    #[error("Agent responded to '{method}' with error: {message}")]
    Exception { method: String, message: String },

    #[error("Unexpected agent response to '{method}': {detail}")]
    UnexpectedResponse { method: String, detail: String },

    #[error("Waiting for agent task '{task_id}' of '{method}': {message}")]
    TaskUnfinished {
        method: String,
        task_id: String,
        message: String,
    },
}

// ── Retry errors ──────────────────────────────────────────────────────────────

/// Exhaustion of a bounded retry strategy. Carries the last failure seen.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("Timed out after {}ms ({attempts} attempts): {last_error}", .timeout.as_millis())]
    TimedOut {
        timeout: Duration,
        attempts: u32,
        last_error: String,
    },

    #[error("Gave up after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },
}

// ── VM errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum VmError {
    #[error("VM '{cid}' cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        cid: String,
        from: VmState,
        to: VmState,
    },
}

// ── Manifest errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("There must only be one job, found {0}")]
    JobCount(usize),

    #[error("Job '{job}' must have only one instance, found {count}")]
    InstanceCount { job: String, count: u32 },

    #[error("Resource pool '{0}' not found")]
    ResourcePoolNotFound(String),

    #[error("Disk pool '{0}' not found")]
    DiskPoolNotFound(String),

    #[error("Network '{0}' not found")]
    NetworkNotFound(String),

    #[error("Invalid update_watch_time '{0}': expected '<start>-<end>' in milliseconds")]
    InvalidWatchTime(String),

    #[error("cloud_provider.mbus is required to reach the agent")]
    MissingMbus,
}

// ── Config errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a boolean, got '{value}'")]
    InvalidBool { name: String, value: String },
}

// ── State errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Current disk record '{0}' is missing from the disk list")]
    DanglingCurrentDisk(String),

    #[error("Disk record '{0}' not found")]
    DiskRecordNotFound(String),

    #[error("Stemcell record '{0}' not found")]
    StemcellRecordNotFound(String),
}

// ── Deploy errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{count} unused disks reached the limit of {limit} and could not be cleaned up")]
    UnusedDiskLimit { count: usize, limit: usize },

    #[error("Failed to delete {failed} of {total} unused disks")]
    UnusedDiskCleanup { failed: usize, total: usize },
}

//! Agent message protocol envelopes.
//!
//! Requests name a method and its positional arguments; responses carry either
//! a `value` or an `exception`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job state reported by a converged agent.
pub const JOB_STATE_RUNNING: &str = "running";

/// Task state reported while an asynchronous agent task is in flight.
pub const TASK_STATE_RUNNING: &str = "running";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub method: String,
    pub arguments: Vec<Value>,
    pub reply_to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub exception: Option<AgentException>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentException {
    #[serde(default)]
    pub message: String,
}

/// `value` of an asynchronous task response (`stop`, `apply`, `mount_disk`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentTaskValue {
    #[serde(default)]
    pub agent_task_id: String,
    #[serde(default)]
    pub state: String,
}

/// `value` of a `get_state` response. Only the job state matters here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentStateValue {
    #[serde(default)]
    pub job_state: String,
}

impl AgentRequest {
    #[must_use]
    pub fn new(method: &str, arguments: Vec<Value>, reply_to: &str) -> Self {
        Self {
            method: method.to_string(),
            arguments,
            reply_to: reply_to.to_string(),
        }
    }
}

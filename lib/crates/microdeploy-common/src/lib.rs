//! Wire types for the two protocols microdeploy speaks: the CPI subprocess
//! protocol and the agent message protocol.

pub mod agent;
pub mod cpi;

pub use agent::{
    AgentException, AgentRequest, AgentResponse, AgentStateValue, AgentTaskValue,
    JOB_STATE_RUNNING, TASK_STATE_RUNNING,
};
pub use cpi::{
    CpiCommand, CpiContext, CpiErrorPayload, CpiResult, CpiStemcellContext, CpiVmContext,
};

//! VM lifecycle state.
//!
//! A [`Vm`] is a handle on a cloud VM CID plus the stemcell API version used
//! to reach it. Its state only moves along the edges listed in
//! [`VmState::can_transition_to`].

use crate::domain::error::VmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Absent,
    /// The CPI returned a CID but the agent has not answered yet.
    Creating,
    /// The agent answered a ping.
    Ready,
    Applying,
    Starting,
    Running,
    Deleting,
}

impl VmState {
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use VmState::{Absent, Applying, Creating, Deleting, Ready, Running, Starting};
        matches!(
            (self, next),
            (Absent, Creating)
                | (Creating, Ready)
                | (Ready | Running, Applying)
                | (Applying, Starting)
                | (Starting, Running)
                | (Creating | Ready | Applying | Starting | Running, Deleting)
                | (Deleting, Absent)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vm {
    cid: String,
    stemcell_api_version: u32,
    state: VmState,
}

impl Vm {
    /// Freshly created by the CPI, agent not yet confirmed.
    #[must_use]
    pub fn created(cid: impl Into<String>, stemcell_api_version: u32) -> Self {
        Self {
            cid: cid.into(),
            stemcell_api_version,
            state: VmState::Creating,
        }
    }

    /// Recorded by a previous deploy and still known to the CPI.
    #[must_use]
    pub fn existing(cid: impl Into<String>, stemcell_api_version: u32) -> Self {
        Self {
            cid: cid.into(),
            stemcell_api_version,
            state: VmState::Ready,
        }
    }

    #[must_use]
    pub fn cid(&self) -> &str {
        &self.cid
    }

    #[must_use]
    pub fn stemcell_api_version(&self) -> u32 {
        self.stemcell_api_version
    }

    #[must_use]
    pub fn state(&self) -> VmState {
        self.state
    }

    /// Move to `next`, rejecting edges the lifecycle does not allow.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::InvalidTransition`] for a disallowed edge. The
    /// current state is left unchanged.
    pub fn transition(&mut self, next: VmState) -> Result<(), VmError> {
        if !self.state.can_transition_to(next) {
            return Err(VmError::InvalidTransition {
                cid: self.cid.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

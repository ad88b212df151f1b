//! Write-through access to the persisted deployment state.
//!
//! Every mutation is saved before the caller moves on, so a crash between two
//! cloud calls never forgets a VM or disk that was already created.

use anyhow::{Context, Result};

use crate::application::ports::DeploymentStateStore;
use crate::domain::DeploymentState;

pub struct Records<'a, S> {
    store: &'a S,
    state: DeploymentState,
}

impl<'a, S: DeploymentStateStore> Records<'a, S> {
    /// Load the stored state, starting fresh when none exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored state cannot be read.
    pub async fn load(store: &'a S) -> Result<Self> {
        let state = store
            .load_async()
            .await
            .context("loading deployment state")?
            .map(|mut state| {
                state.ensure_director_id();
                state
            })
            .unwrap_or_else(DeploymentState::new);
        Ok(Self { store, state })
    }

    #[must_use]
    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    /// Apply `change` and persist the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be saved. The in-memory change is
    /// kept either way.
    pub async fn update<T>(&mut self, change: impl FnOnce(&mut DeploymentState) -> T) -> Result<T> {
        let out = change(&mut self.state);
        self.store
            .save_async(&self.state)
            .await
            .context("saving deployment state")?;
        Ok(out)
    }

    #[must_use]
    pub fn into_state(self) -> DeploymentState {
        self.state
    }
}

/// The director identity sent with every CPI call.
///
/// Generated and saved on first use so later runs reuse it. The state is only
/// written when the identity is new.
///
/// # Errors
///
/// Returns an error if the stored state cannot be read or written.
pub async fn director_id(store: &impl DeploymentStateStore) -> Result<String> {
    let state = match store
        .load_async()
        .await
        .context("loading deployment state")?
    {
        Some(state) if !state.director_id.is_empty() => return Ok(state.director_id),
        Some(mut state) => {
            state.ensure_director_id();
            state
        }
        None => DeploymentState::new(),
    };
    store
        .save_async(&state)
        .await
        .context("saving deployment state")?;
    Ok(state.director_id)
}

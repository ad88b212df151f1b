//! Bounded retry strategies and the two agent retryables built on them.
//!
//! Readiness (`ping`) is bounded by wall-clock time because agent boot time is
//! unpredictable. Convergence (`get_state`) is bounded by attempt count
//! because the manifest's watch time translates into a number of polls.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::Result;
use microdeploy_common::JOB_STATE_RUNNING;
use tokio::time::Instant;
use tracing::debug;

use crate::application::ports::AgentClient;
use crate::domain::error::RetryError;

/// One attempt of a retryable operation.
///
/// Returns whether a failure may be retried, and the outcome. An `Ok`
/// outcome ends the retry loop regardless of the flag.
#[allow(async_fn_in_trait)]
pub trait Retryable {
    async fn attempt(&mut self) -> (bool, Result<()>);
}

/// Retries up to `max_attempts` times with a fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRetryStrategy {
    max_attempts: u32,
    delay: Duration,
}

impl AttemptRetryStrategy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `retryable` until it succeeds, refuses a retry, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the attempt's own error when it is not retryable, or
    /// [`RetryError::AttemptsExhausted`] carrying the last error.
    pub async fn run(&self, retryable: &mut impl Retryable) -> Result<()> {
        let mut last_error = String::from("no attempts made");
        for attempt in 1..=self.max_attempts {
            let (retry, outcome) = retryable.attempt().await;
            let err = match outcome {
                Ok(()) => return Ok(()),
                Err(err) if !retry => return Err(err),
                Err(err) => err,
            };
            debug!(attempt, max = self.max_attempts, error = %err, "Attempt failed");
            last_error = format!("{err:#}");
            if attempt < self.max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        Err(RetryError::AttemptsExhausted {
            attempts: self.max_attempts,
            last_error,
        }
        .into())
    }
}

/// Retries with a fixed delay until `timeout` would be exceeded.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutRetryStrategy {
    timeout: Duration,
    delay: Duration,
}

impl TimeoutRetryStrategy {
    #[must_use]
    pub fn new(timeout: Duration, delay: Duration) -> Self {
        Self { timeout, delay }
    }

    /// Run `retryable` until it succeeds, refuses a retry, or time runs out.
    ///
    /// Another attempt is only started if it can begin before the deadline.
    ///
    /// # Errors
    ///
    /// Returns the attempt's own error when it is not retryable, or
    /// [`RetryError::TimedOut`] carrying the last error.
    pub async fn run(&self, retryable: &mut impl Retryable) -> Result<()> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let (retry, outcome) = retryable.attempt().await;
            let err = match outcome {
                Ok(()) => return Ok(()),
                Err(err) if !retry => return Err(err),
                Err(err) => err,
            };
            debug!(attempts, error = %err, "Attempt failed");
            if started.elapsed() + self.delay > self.timeout {
                return Err(RetryError::TimedOut {
                    timeout: self.timeout,
                    attempts,
                    last_error: format!("{err:#}"),
                }
                .into());
            }
            tokio::time::sleep(self.delay).await;
        }
    }
}

// ── Agent retryables ─────────────────────────────────────────────────────────

/// Succeeds as soon as the agent answers a ping. Every failure is retried.
pub struct PingRetryable<'a, A> {
    agent: &'a A,
}

impl<'a, A: AgentClient> PingRetryable<'a, A> {
    #[must_use]
    pub fn new(agent: &'a A) -> Self {
        Self { agent }
    }
}

impl<A: AgentClient> Retryable for PingRetryable<'_, A> {
    async fn attempt(&mut self) -> (bool, Result<()>) {
        match self.agent.ping().await {
            Ok(_) => (false, Ok(())),
            Err(err) => (true, Err(err.into())),
        }
    }
}

/// Succeeds once the agent reports the job state `running`.
///
/// Errors and other states are retried; the last observed state is kept.
pub struct GetStateRetryable<'a, A> {
    agent: &'a A,
    last_state: Option<String>,
}

impl<'a, A: AgentClient> GetStateRetryable<'a, A> {
    #[must_use]
    pub fn new(agent: &'a A) -> Self {
        Self {
            agent,
            last_state: None,
        }
    }

    #[must_use]
    pub fn last_state(&self) -> Option<&str> {
        self.last_state.as_deref()
    }
}

impl<A: AgentClient> Retryable for GetStateRetryable<'_, A> {
    async fn attempt(&mut self) -> (bool, Result<()>) {
        match self.agent.get_state().await {
            Ok(state) if state == JOB_STATE_RUNNING => {
                self.last_state = Some(state);
                (false, Ok(()))
            }
            Ok(state) => {
                let err = anyhow::anyhow!("Received non-running job state: '{state}'");
                self.last_state = Some(state);
                (true, Err(err))
            }
            Err(err) => (true, Err(err.into())),
        }
    }
}

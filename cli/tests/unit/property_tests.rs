//! Property-based tests for migration decisions, API negotiation and retries.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use anyhow::Result;
use proptest::prelude::*;
use serde_json::{Map, Value, json};

use microdeploy_cli::application::services::retry::{
    AttemptRetryStrategy, Retryable, TimeoutRetryStrategy,
};
use microdeploy_cli::domain::cpi::negotiate_api_version;
use microdeploy_cli::domain::{DiskRecord, WatchTime};

fn props(pairs: &[(String, u32)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect()
}

// ============================================================================
// DiskRecord::needs_migration()
// ============================================================================

proptest! {
    /// A disk never needs migrating to its own shape.
    #[test]
    fn prop_same_shape_never_migrates(
        size in 1u64..1_000_000,
        pairs in prop::collection::vec(("[a-z]{1,8}", 0u32..100), 0..4),
    ) {
        let cloud_properties = props(&pairs);
        let disk = DiskRecord {
            id: "id".to_string(),
            cid: "cid".to_string(),
            size,
            cloud_properties: cloud_properties.clone(),
        };
        prop_assert!(!disk.needs_migration(size, &cloud_properties));
    }

    /// Any size change requires a migration.
    #[test]
    fn prop_size_change_migrates(current in 1u64..1_000_000, desired in 1u64..1_000_000) {
        prop_assume!(current != desired);
        let disk = DiskRecord {
            id: "id".to_string(),
            cid: "cid".to_string(),
            size: current,
            cloud_properties: Map::new(),
        };
        prop_assert!(disk.needs_migration(desired, &Map::new()));
    }
}

#[test]
fn test_cloud_properties_change_migrates() {
    let disk = DiskRecord {
        id: "id".to_string(),
        cid: "cid".to_string(),
        size: 1024,
        cloud_properties: props(&[("iops".to_string(), 100)]),
    };
    assert!(disk.needs_migration(1024, &props(&[("iops".to_string(), 200)])));
    assert!(disk.needs_migration(1024, &Map::new()));
}

// ============================================================================
// negotiate_api_version() and WatchTime::attempts()
// ============================================================================

proptest! {
    /// The negotiated version never exceeds what either side supports.
    #[test]
    fn prop_api_version_is_clamped(reported in 0u64..u64::MAX) {
        let negotiated = negotiate_api_version(reported);
        prop_assert!(negotiated <= 2);
        prop_assert!(u64::from(negotiated) <= reported);
    }

    /// There is always at least one convergence attempt.
    #[test]
    fn prop_watch_time_allows_one_attempt(
        start in 0u64..100_000,
        span in 0u64..1_000_000,
        delay in 0u64..10_000,
    ) {
        let watch = WatchTime { start_ms: start, end_ms: start + span };
        prop_assert!(watch.attempts(delay) >= 1);
    }
}

// ============================================================================
// Retry strategies
// ============================================================================

struct Flaky {
    failures_left: u32,
    attempts: u32,
}

impl Retryable for Flaky {
    async fn attempt(&mut self) -> (bool, Result<()>) {
        self.attempts += 1;
        if self.failures_left == 0 {
            return (true, Ok(()));
        }
        self.failures_left -= 1;
        (true, Err(anyhow::anyhow!("attempt {} failed", self.attempts)))
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    /// Attempt-bounded retries make at most `max` attempts and succeed iff
    /// the operation recovers within them.
    #[test]
    fn prop_attempt_strategy_bounds_attempts(max in 1u32..20, failures in 0u32..30) {
        let mut flaky = Flaky { failures_left: failures, attempts: 0 };
        let strategy = AttemptRetryStrategy::new(max, Duration::from_millis(100));
        let outcome = block_on(strategy.run(&mut flaky));

        prop_assert!(flaky.attempts <= max);
        prop_assert_eq!(outcome.is_ok(), failures < max);
        if failures < max {
            prop_assert_eq!(flaky.attempts, failures + 1);
        }
    }

    /// Time-bounded retries never start an attempt past the deadline.
    #[test]
    fn prop_timeout_strategy_respects_deadline(timeout_ms in 0u64..5_000, delay_ms in 1u64..500) {
        let mut flaky = Flaky { failures_left: u32::MAX, attempts: 0 };
        let strategy = TimeoutRetryStrategy::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(delay_ms),
        );
        let outcome = block_on(strategy.run(&mut flaky));

        prop_assert!(outcome.is_err());
        let max_attempts = u32::try_from(timeout_ms / delay_ms).unwrap() + 1;
        prop_assert!(flaky.attempts <= max_attempts);
    }
}

#[test]
fn test_non_retryable_error_stops_immediately() {
    struct Fatal(u32);
    impl Retryable for Fatal {
        async fn attempt(&mut self) -> (bool, Result<()>) {
            self.0 += 1;
            (false, Err(anyhow::anyhow!("fatal")))
        }
    }

    let mut fatal = Fatal(0);
    let err = block_on(AttemptRetryStrategy::new(5, Duration::from_secs(1)).run(&mut fatal))
        .unwrap_err();
    assert_eq!(fatal.0, 1);
    assert_eq!(err.to_string(), "fatal");
}

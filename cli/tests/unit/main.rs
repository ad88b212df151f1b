//! Unit tests for microdeploy
//!
//! These tests drive the application services with in-memory doubles and run
//! fast without external I/O.

mod deploy_scenarios;
mod mocks;
mod property_tests;

//! Integration tests for microdeploy
//!
//! These tests spawn real processes: a scripted CPI plugin and the binary
//! itself. They are slower and should be run separately from unit tests.

mod cli_tests;

//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the CPI
//! subprocess protocol, the agent HTTP client, and state, config and input
//! files on disk.
//!
//! Imports from `crate::domain`, `crate::application::ports` and the retry
//! strategies in `crate::application::services::retry` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod agent_client;
pub mod command_runner;
pub mod config;
pub mod cpi;
pub mod fs;
pub mod state;

//! Application services for the deployment's single VM.
//!
//! Each module imports only from `crate::domain` and
//! `crate::application::ports`.

pub mod lifecycle;

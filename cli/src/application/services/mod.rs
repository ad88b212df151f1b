//! Application services: use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod deploy;
pub mod deployment_record;
pub mod disk;
pub mod records;
pub mod retry;
pub mod stemcell;
pub mod vm;

#[cfg(test)]
pub(crate) mod test_support;

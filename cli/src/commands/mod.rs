//! Command implementations

pub mod cpi_info;
pub mod delete;
pub mod deploy;

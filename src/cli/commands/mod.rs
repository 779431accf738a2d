//! CLI command implementations
//!
//! Every command returns the process exit code: 0 success, 2 configuration
//! error, 3 validation failed, 4 connection error, 5 fatal.

pub mod build;
pub mod check;
pub mod init;
pub mod init_schema;
pub mod stage_csv;
pub mod stage_fhir;
pub mod status;
pub mod validate;

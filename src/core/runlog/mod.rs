//! Build audit trail in `etl_run_log`

pub mod entry;
pub mod logger;

pub use entry::{RunLogEntry, RunStatus};
pub use logger::RunLogger;

//! Atomic warehouse replacement

pub mod coordinator;

pub use coordinator::{CommitResult, CommitStatus, TransactionCoordinator};

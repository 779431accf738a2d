//! In-memory store
//!
//! Backs tests and local experiments with the same traits the PostgreSQL
//! adapter implements.

pub mod store;
pub mod transaction;

pub use store::{FaultPlan, MemoryStore};
pub use transaction::MemoryTransaction;

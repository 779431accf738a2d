//! Store abstraction layer
//!
//! Trait-based access to staging, the run log and the warehouse, so the
//! pipeline runs unchanged against PostgreSQL or the in-memory store.

pub mod factory;
pub mod traits;

pub use factory::{create_stores, StoreHandles};
pub use traits::{RunLogStore, StagingSource, WarehouseStore, WarehouseTransaction};

//! Warehouse build
//!
//! Turns [`ValidatedRecords`](crate::core::validation::ValidatedRecords) into
//! the dimension and fact rows of a [`WarehouseDelta`](crate::domain::WarehouseDelta).

pub mod builder;
pub mod sources;

pub use builder::build;

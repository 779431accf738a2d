//! PostgreSQL integration
//!
//! Staging tables, the run log and the star-schema warehouse all live in
//! one PostgreSQL database.

pub mod adapter;
pub mod client;
pub mod models;
pub mod transaction;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
pub use transaction::PostgreSQLTransaction;

//! Staging boundary
//!
//! Staging tables are read as text, then decoded into typed records. The
//! [`StagingLoader`] reads the tables a configured source mode selects and
//! concatenates them into one [`StagedBatch`](crate::domain::StagedBatch).
//! CSV and FHIR staging write through [`replace_under_run`].

pub mod decode;
pub mod loader;
pub mod tables;
pub mod writer;

pub use decode::{decode_table, parse_timestamp};
pub use loader::StagingLoader;
pub use tables::{column_bag, ColumnBag, StagingRows, StagingTable};
pub use writer::replace_under_run;

//! CSV extract staging into the `stg_*` tables

pub mod ingest;

pub use ingest::{extract_file, ingest_directory, CsvIngestor, CsvStageReport};

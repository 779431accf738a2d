//! FHIR bundle ingestion into the `stg_fhir_*` staging tables

pub mod bundle;
pub mod ingest;

pub use bundle::{ref_id, stage_bundle};
pub use ingest::{ingest_directory, FhirIngestor, FhirStageReport};

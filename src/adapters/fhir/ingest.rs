//! FHIR directory ingestion
//!
//! Reads every `*.json` bundle of a directory (in file name order) and
//! replaces the `stg_fhir_*` tables with their content in one transaction.

use crate::adapters::database::traits::StagingSource;
use crate::adapters::fhir::bundle::stage_bundle;
use crate::core::runlog::RunLogger;
use crate::core::staging::tables::{StagingRows, StagingTable};
use crate::core::staging::writer::replace_under_run;
use crate::domain::ids::RunId;
use crate::domain::{ClinistarError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Parse every bundle in `dir` into staging rows
///
/// The result holds all four FHIR tables, empty ones included, so
/// replacing them clears stale rows.
///
/// # Errors
///
/// Returns `ClinistarError::Fhir` if the directory is missing or holds no
/// JSON files, a file is not a valid bundle, or no Patient or Encounter
/// resource was found.
pub fn ingest_directory(dir: &Path) -> Result<StagingRows> {
    if !dir.is_dir() {
        return Err(ClinistarError::Fhir(format!(
            "Missing folder: {}",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(ClinistarError::Fhir(format!(
            "No .json files found in {}",
            dir.display()
        )));
    }

    let mut rows = StagingRows::default();
    for table in StagingTable::FHIR {
        rows.tables.insert(table, Vec::new());
    }

    for path in &files {
        let content = fs::read_to_string(path)?;
        let bundle: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            ClinistarError::Fhir(format!("Could not parse JSON: {} ({e})", path.display()))
        })?;
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        stage_bundle(&bundle, &source_file, &mut rows)?;
        tracing::debug!(file = %source_file, "Parsed FHIR bundle");
    }

    if rows.count(StagingTable::FhirPatient) == 0 {
        return Err(ClinistarError::Fhir("No Patient resources found".to_string()));
    }
    if rows.count(StagingTable::FhirEncounter) == 0 {
        return Err(ClinistarError::Fhir("No Encounter resources found".to_string()));
    }

    tracing::info!(
        files = files.len(),
        patients = rows.count(StagingTable::FhirPatient),
        encounters = rows.count(StagingTable::FhirEncounter),
        observations = rows.count(StagingTable::FhirObservation),
        charge_items = rows.count(StagingTable::FhirChargeItem),
        "FHIR bundles parsed"
    );

    Ok(rows)
}

/// Result of staging a FHIR directory
#[derive(Debug, Clone)]
pub struct FhirStageReport {
    pub run_id: RunId,
    pub rows: StagingRows,
}

impl FhirStageReport {
    /// Run log notes for the staged row counts
    pub fn notes(&self) -> String {
        fhir_notes(&self.rows)
    }
}

fn fhir_notes(rows: &StagingRows) -> String {
    format!(
        "FHIR staged: patient={}, encounter={}, obs={}, chargeitem={}",
        rows.count(StagingTable::FhirPatient),
        rows.count(StagingTable::FhirEncounter),
        rows.count(StagingTable::FhirObservation),
        rows.count(StagingTable::FhirChargeItem)
    )
}

/// Stages FHIR bundles under its own run log entry
pub struct FhirIngestor {
    staging: Arc<dyn StagingSource + Send + Sync>,
    run_logger: RunLogger,
}

impl FhirIngestor {
    pub fn new(staging: Arc<dyn StagingSource + Send + Sync>, run_logger: RunLogger) -> Self {
        Self {
            staging,
            run_logger,
        }
    }

    /// Parse `dir` and replace the FHIR staging tables
    ///
    /// Bundles are parsed before the run log entry is created, so a bad
    /// directory leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails, or if the staging write fails
    /// (the run is finalized as `failed` first).
    pub async fn stage_directory(&self, dir: &Path) -> Result<FhirStageReport> {
        let rows = ingest_directory(dir)?;
        let notes = fhir_notes(&rows);
        let run_id = replace_under_run(
            self.staging.as_ref(),
            &self.run_logger,
            "ingest fhir bundle(s)",
            &rows,
            &notes,
        )
        .await?;
        Ok(FhirStageReport { run_id, rows })
    }
}

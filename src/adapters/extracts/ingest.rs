//! CSV extract ingestion
//!
//! Reads the CSV extracts of a directory and replaces the CSV staging
//! tables with their content in one transaction. Header names are trimmed
//! and lowercased; unknown columns are ignored and empty cells load as NULL.

use crate::adapters::database::traits::StagingSource;
use crate::core::runlog::RunLogger;
use crate::core::staging::tables::{ColumnBag, StagingRows, StagingTable};
use crate::core::staging::writer::replace_under_run;
use crate::domain::ids::RunId;
use crate::domain::{ClinistarError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Extract file for a CSV staging table, and whether it must be present
///
/// Provider and department extracts are optional; without them both
/// dimensions are derived from encounters. FHIR tables have no extract.
pub fn extract_file(table: StagingTable) -> Option<(&'static str, bool)> {
    match table {
        StagingTable::CsvDepartments => Some(("departments.csv", false)),
        StagingTable::CsvProviders => Some(("providers.csv", false)),
        StagingTable::CsvPatients => Some(("patients.csv", true)),
        StagingTable::CsvEncounters => Some(("encounters.csv", true)),
        StagingTable::CsvCharges => Some(("charges.csv", true)),
        StagingTable::CsvLabs => Some(("labs.csv", true)),
        _ => None,
    }
}

/// Read every CSV extract in `dir` into staging rows
///
/// The result holds all six CSV tables, so an absent optional extract
/// clears stale rows from its table.
///
/// # Errors
///
/// Returns `ClinistarError::Staging` if the directory or a required file is
/// missing, or a file is not valid CSV.
pub fn ingest_directory(dir: &Path) -> Result<StagingRows> {
    if !dir.is_dir() {
        return Err(ClinistarError::Staging(format!(
            "Missing folder: {}",
            dir.display()
        )));
    }

    let mut rows = StagingRows::default();
    for table in StagingTable::CSV {
        let Some((file, required)) = extract_file(table) else {
            continue;
        };
        let path = dir.join(file);

        let table_rows = if path.is_file() {
            read_extract(table, &path)?
        } else if required {
            return Err(ClinistarError::Staging(format!(
                "Missing file: {}",
                path.display()
            )));
        } else {
            tracing::debug!(table = %table, file = file, "Optional extract absent");
            Vec::new()
        };

        tracing::debug!(table = %table, rows = table_rows.len(), "Read CSV extract");
        rows.tables.insert(table, table_rows);
    }

    tracing::info!(
        departments = rows.count(StagingTable::CsvDepartments),
        providers = rows.count(StagingTable::CsvProviders),
        patients = rows.count(StagingTable::CsvPatients),
        encounters = rows.count(StagingTable::CsvEncounters),
        charges = rows.count(StagingTable::CsvCharges),
        labs = rows.count(StagingTable::CsvLabs),
        "CSV extracts parsed"
    );

    Ok(rows)
}

fn read_extract(table: StagingTable, path: &Path) -> Result<Vec<ColumnBag>> {
    let csv_error =
        |e: csv::Error| ClinistarError::Staging(format!("Could not read {}: {e}", path.display()));

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let positions: HashMap<String, usize> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .enumerate()
        .map(|(i, header)| (header.to_lowercase(), i))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row: ColumnBag = table
            .columns()
            .iter()
            .map(|column| {
                let value = positions
                    .get(*column)
                    .and_then(|i| record.get(*i))
                    .filter(|v| !v.is_empty())
                    .map(str::to_string);
                (column.to_string(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Result of staging a CSV extract directory
#[derive(Debug, Clone)]
pub struct CsvStageReport {
    pub run_id: RunId,
    pub rows: StagingRows,
}

impl CsvStageReport {
    /// Run log notes for the staged row count
    pub fn notes(&self) -> String {
        csv_notes(&self.rows)
    }
}

fn csv_notes(rows: &StagingRows) -> String {
    format!("loaded staging tables, rows={}", rows.total_rows())
}

/// Stages CSV extracts under its own run log entry
pub struct CsvIngestor {
    staging: Arc<dyn StagingSource + Send + Sync>,
    run_logger: RunLogger,
}

impl CsvIngestor {
    pub fn new(staging: Arc<dyn StagingSource + Send + Sync>, run_logger: RunLogger) -> Self {
        Self {
            staging,
            run_logger,
        }
    }

    /// Read `dir` and replace the CSV staging tables
    ///
    /// Extracts are read before the run log entry is created, so a bad
    /// directory leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, or if the staging write fails
    /// (the run is finalized as `failed` first).
    pub async fn stage_directory(&self, dir: &Path) -> Result<CsvStageReport> {
        let rows = ingest_directory(dir)?;
        let notes = csv_notes(&rows);
        let run_id = replace_under_run(
            self.staging.as_ref(),
            &self.run_logger,
            "load staging",
            &rows,
            &notes,
        )
        .await?;
        Ok(CsvStageReport { run_id, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_required(dir: &Path) {
        fs::write(dir.join("patients.csv"), "patient_id,birth_year,sex\nP1,1980,F\n").unwrap();
        fs::write(
            dir.join("encounters.csv"),
            "encounter_id,patient_id,provider_id,department_id,admit_ts,discharge_ts,encounter_type\n\
             E1,P1,DR1,CARD,2024-03-01 08:00:00,2024-03-04 10:00:00,inpatient\n",
        )
        .unwrap();
        fs::write(
            dir.join("charges.csv"),
            "charge_id,encounter_id,cpt_code,amount,posted_ts\nC1,E1,99213,100.00,\n",
        )
        .unwrap();
        fs::write(
            dir.join("labs.csv"),
            "lab_id,encounter_id,loinc_code,result_value,unit,result_ts\n",
        )
        .unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let err = ingest_directory(Path::new("/nonexistent/raw")).unwrap_err();
        assert!(err.to_string().contains("Missing folder"));
    }

    #[test]
    fn test_missing_required_file() {
        let dir = TempDir::new().unwrap();
        write_required(dir.path());
        fs::remove_file(dir.path().join("charges.csv")).unwrap();

        let err = ingest_directory(dir.path()).unwrap_err();
        assert!(err.to_string().contains("charges.csv"));
    }

    #[test]
    fn test_optional_extracts_stage_empty_tables() {
        let dir = TempDir::new().unwrap();
        write_required(dir.path());

        let rows = ingest_directory(dir.path()).unwrap();
        assert_eq!(rows.tables.len(), 6);
        assert_eq!(rows.count(StagingTable::CsvProviders), 0);
        assert_eq!(rows.count(StagingTable::CsvLabs), 0);
        assert_eq!(rows.count(StagingTable::CsvCharges), 1);
        assert_eq!(rows.total_rows(), 3);
    }

    #[test]
    fn test_headers_are_normalized_and_empty_cells_are_null() {
        let dir = TempDir::new().unwrap();
        write_required(dir.path());
        fs::write(
            dir.path().join("patients.csv"),
            " Patient_ID , SEX ,extra\nP1, F ,x\nP2,,y\n",
        )
        .unwrap();

        let rows = ingest_directory(dir.path()).unwrap();
        let patients = rows.rows(StagingTable::CsvPatients);
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0]["patient_id"].as_deref(), Some("P1"));
        assert_eq!(patients[0]["sex"].as_deref(), Some("F"));
        assert_eq!(patients[0]["birth_year"], None);
        assert_eq!(patients[1]["sex"], None);
        assert!(!patients[0].contains_key("extra"));
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_required(dir.path());
        fs::write(dir.path().join("labs.csv"), "lab_id,encounter_id\nL1,E1,extra\n").unwrap();

        let err = ingest_directory(dir.path()).unwrap_err();
        assert!(err.to_string().contains("labs.csv"));
    }
}

//! Staging table catalog
//!
//! Staging rows are read as text columns (`col::text`) and carried as a
//! [`ColumnBag`] until [`decode`](crate::core::staging::decode) turns them into
//! typed records.

use crate::config::StagingSourceMode;
use crate::domain::records::SourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Column name to nullable text value
pub type ColumnBag = BTreeMap<String, Option<String>>;

/// Staging tables read by a build or written by CSV and FHIR staging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StagingTable {
    CsvDepartments,
    CsvProviders,
    CsvPatients,
    CsvEncounters,
    CsvCharges,
    CsvLabs,
    FhirPatient,
    FhirEncounter,
    FhirObservation,
    FhirChargeItem,
}

impl StagingTable {
    pub const CSV: [StagingTable; 6] = [
        StagingTable::CsvDepartments,
        StagingTable::CsvProviders,
        StagingTable::CsvPatients,
        StagingTable::CsvEncounters,
        StagingTable::CsvCharges,
        StagingTable::CsvLabs,
    ];

    pub const FHIR: [StagingTable; 4] = [
        StagingTable::FhirPatient,
        StagingTable::FhirEncounter,
        StagingTable::FhirObservation,
        StagingTable::FhirChargeItem,
    ];

    /// Tables a build reads for a source mode, in read order
    pub fn for_mode(mode: StagingSourceMode) -> Vec<StagingTable> {
        match mode {
            StagingSourceMode::Csv => Self::CSV.to_vec(),
            StagingSourceMode::Fhir => Self::FHIR.to_vec(),
            StagingSourceMode::Both => Self::CSV.iter().chain(Self::FHIR.iter()).copied().collect(),
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            StagingTable::CsvDepartments => "stg_departments",
            StagingTable::CsvProviders => "stg_providers",
            StagingTable::CsvPatients => "stg_patients",
            StagingTable::CsvEncounters => "stg_encounters",
            StagingTable::CsvCharges => "stg_charges",
            StagingTable::CsvLabs => "stg_labs",
            StagingTable::FhirPatient => "stg_fhir_patient",
            StagingTable::FhirEncounter => "stg_fhir_encounter",
            StagingTable::FhirObservation => "stg_fhir_observation",
            StagingTable::FhirChargeItem => "stg_fhir_chargeitem",
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            StagingTable::CsvDepartments
            | StagingTable::CsvProviders
            | StagingTable::CsvPatients
            | StagingTable::CsvEncounters
            | StagingTable::CsvCharges
            | StagingTable::CsvLabs => SourceKind::Csv,
            _ => SourceKind::Fhir,
        }
    }

    /// Columns, in table order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            StagingTable::CsvDepartments => &["department_id", "department_name"],
            StagingTable::CsvProviders => &["provider_id", "provider_name", "department_id"],
            StagingTable::CsvPatients => &["patient_id", "birth_year", "sex"],
            StagingTable::CsvEncounters => &[
                "encounter_id",
                "patient_id",
                "provider_id",
                "department_id",
                "admit_ts",
                "discharge_ts",
                "encounter_type",
            ],
            StagingTable::CsvCharges => {
                &["charge_id", "encounter_id", "cpt_code", "amount", "posted_ts"]
            }
            StagingTable::CsvLabs => &[
                "lab_id",
                "encounter_id",
                "loinc_code",
                "result_value",
                "unit",
                "result_ts",
            ],
            StagingTable::FhirPatient => &[
                "patient_id",
                "mrn",
                "name",
                "gender",
                "birth_date",
                "source_file",
            ],
            StagingTable::FhirEncounter => &[
                "encounter_id",
                "patient_id",
                "status",
                "class_system",
                "class_code",
                "class_display",
                "start_ts",
                "end_ts",
                "department",
                "provider_name",
                "source_file",
            ],
            StagingTable::FhirObservation => &[
                "observation_id",
                "patient_id",
                "encounter_id",
                "loinc_system",
                "loinc_code",
                "loinc_display",
                "effective_ts",
                "value",
                "unit",
                "source_file",
            ],
            StagingTable::FhirChargeItem => &[
                "chargeitem_id",
                "patient_id",
                "encounter_id",
                "cpt_system",
                "cpt_code",
                "cpt_display",
                "occurrence_ts",
                "quantity",
                "amount",
                "currency",
                "source_file",
            ],
        }
    }

    /// `SELECT` that reads every column as text, in physical row order
    pub fn select_text_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns()
            .iter()
            .map(|c| format!("{c}::text AS {c}"))
            .collect();
        format!(
            "SELECT {} FROM {} ORDER BY ctid",
            columns.join(", "),
            self.table_name()
        )
    }

    /// Parameterised `INSERT` over every column
    pub fn insert_sql(&self) -> String {
        let columns = self.columns();
        let params: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_name(),
            columns.join(", "),
            params.join(", ")
        )
    }
}

impl fmt::Display for StagingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Staging rows keyed by table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StagingRows {
    pub tables: BTreeMap<StagingTable, Vec<ColumnBag>>,
}

impl StagingRows {
    pub fn push(&mut self, table: StagingTable, row: ColumnBag) {
        self.tables.entry(table).or_default().push(row);
    }

    pub fn rows(&self, table: StagingTable) -> &[ColumnBag] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, table: StagingTable) -> usize {
        self.rows(table).len()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// Builds a column bag from `(column, value)` pairs
pub fn column_bag<'a, I, V>(pairs: I) -> ColumnBag
where
    I: IntoIterator<Item = (&'a str, V)>,
    V: Into<Option<String>>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect()
}

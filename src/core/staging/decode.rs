//! Staging row decoding
//!
//! Turns text column bags into typed [`StagedPayload`]s. Decoding is where
//! "field map" rows become records with a fixed schema: a row that cannot be
//! decoded stops the run with [`ClinistarError::Staging`] naming the table,
//! the row position and the column.

use crate::core::staging::tables::{ColumnBag, StagingTable};
use crate::domain::ids::{DepartmentId, EncounterId, PatientId, ProviderId};
use crate::domain::money::Amount;
use crate::domain::records::{
    ChargeRecord, DepartmentRecord, EncounterRecord, LabRecord, PatientRecord, ProviderRecord,
    StagedBatch, StagedPayload,
};
use crate::domain::{ClinistarError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Id used when a FHIR encounter names no provider or location
pub const UNKNOWN_DIMENSION_ID: &str = "UNKNOWN";

/// Decodes every row of one staging table, keeping row order
///
/// FHIR observations without an encounter reference are skipped; they
/// cannot be attached to a fact row.
///
/// # Errors
///
/// Returns `ClinistarError::Staging` for the first row that cannot be decoded.
pub fn decode_table(table: StagingTable, rows: &[ColumnBag]) -> Result<StagedBatch> {
    let mut batch = StagedBatch::default();
    let mut skipped = 0usize;

    for (index, row) in rows.iter().enumerate() {
        let decoded = decode_row(table, row).map_err(|e| {
            ClinistarError::Staging(format!("{table} row {}: {e}", index + 1))
        })?;
        match decoded {
            Some(payload) => batch.push(table.source_kind(), payload),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(
            table = %table,
            skipped = skipped,
            "Skipped staging rows that reference no encounter"
        );
    }

    tracing::debug!(table = %table, rows = batch.len(), "Decoded staging table");
    Ok(batch)
}

fn decode_row(
    table: StagingTable,
    row: &ColumnBag,
) -> std::result::Result<Option<StagedPayload>, String> {
    let payload = match table {
        StagingTable::CsvDepartments => StagedPayload::Department(DepartmentRecord {
            department_id: DepartmentId::new(required(row, "department_id")?)?,
            department_name: required(row, "department_name")?.to_string(),
        }),
        StagingTable::CsvProviders => StagedPayload::Provider(ProviderRecord {
            provider_id: ProviderId::new(required(row, "provider_id")?)?,
            provider_name: required(row, "provider_name")?.to_string(),
            department_id: DepartmentId::new(required(row, "department_id")?)?,
        }),
        StagingTable::CsvPatients => StagedPayload::Patient(PatientRecord {
            patient_id: PatientId::new(required(row, "patient_id")?)?,
            birth_year: optional(row, "birth_year").map(parse_year).transpose()?,
            sex: optional(row, "sex").map(str::to_string),
        }),
        StagingTable::CsvEncounters => StagedPayload::Encounter(EncounterRecord {
            encounter_id: EncounterId::new(required(row, "encounter_id")?)?,
            patient_id: PatientId::new(required(row, "patient_id")?)?,
            provider_id: ProviderId::new(required(row, "provider_id")?)?,
            department_id: DepartmentId::new(required(row, "department_id")?)?,
            admit_ts: parse_timestamp(required(row, "admit_ts")?)?,
            discharge_ts: parse_timestamp(required(row, "discharge_ts")?)?,
            encounter_type: optional(row, "encounter_type").map(str::to_string),
        }),
        StagingTable::CsvCharges => StagedPayload::Charge(ChargeRecord {
            charge_id: required(row, "charge_id")?.to_string(),
            encounter_id: EncounterId::new(required(row, "encounter_id")?)?,
            amount: parse_amount(required(row, "amount")?)?,
            code: optional(row, "cpt_code").map(str::to_string),
            posted_ts: optional(row, "posted_ts").map(parse_timestamp).transpose()?,
        }),
        StagingTable::CsvLabs => StagedPayload::Lab(LabRecord {
            lab_id: required(row, "lab_id")?.to_string(),
            encounter_id: EncounterId::new(required(row, "encounter_id")?)?,
            code: optional(row, "loinc_code").map(str::to_string),
            value: optional(row, "result_value").map(parse_number).transpose()?,
            unit: optional(row, "unit").map(str::to_string),
            result_ts: optional(row, "result_ts").map(parse_timestamp).transpose()?,
        }),
        StagingTable::FhirPatient => StagedPayload::Patient(PatientRecord {
            patient_id: PatientId::new(required(row, "patient_id")?)?,
            birth_year: optional(row, "birth_date").map(parse_year).transpose()?,
            sex: optional(row, "gender").map(fhir_gender_code),
        }),
        StagingTable::FhirEncounter => StagedPayload::Encounter(EncounterRecord {
            encounter_id: EncounterId::new(required(row, "encounter_id")?)?,
            patient_id: PatientId::new(required(row, "patient_id")?)?,
            provider_id: ProviderId::new(
                optional(row, "provider_name").unwrap_or(UNKNOWN_DIMENSION_ID),
            )?,
            department_id: DepartmentId::new(
                optional(row, "department").unwrap_or(UNKNOWN_DIMENSION_ID),
            )?,
            admit_ts: parse_timestamp(required(row, "start_ts")?)?,
            discharge_ts: parse_timestamp(required(row, "end_ts")?)?,
            encounter_type: optional(row, "class_code")
                .or_else(|| optional(row, "class_display"))
                .map(str::to_string),
        }),
        StagingTable::FhirObservation => {
            let Some(encounter_id) = optional(row, "encounter_id") else {
                return Ok(None);
            };
            StagedPayload::Lab(LabRecord {
                lab_id: required(row, "observation_id")?.to_string(),
                encounter_id: EncounterId::new(encounter_id)?,
                code: optional(row, "loinc_code").map(str::to_string),
                value: optional(row, "value").map(parse_number).transpose()?,
                unit: optional(row, "unit").map(str::to_string),
                result_ts: optional(row, "effective_ts").map(parse_timestamp).transpose()?,
            })
        }
        StagingTable::FhirChargeItem => StagedPayload::Charge(ChargeRecord {
            charge_id: required(row, "chargeitem_id")?.to_string(),
            encounter_id: EncounterId::new(required(row, "encounter_id")?)?,
            amount: parse_amount(required(row, "amount")?)?,
            code: optional(row, "cpt_code").map(str::to_string),
            posted_ts: optional(row, "occurrence_ts").map(parse_timestamp).transpose()?,
        }),
    };
    Ok(Some(payload))
}

/// Trimmed, non-empty column value
fn optional<'a>(row: &'a ColumnBag, column: &str) -> Option<&'a str> {
    row.get(column)
        .and_then(|v| v.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn required<'a>(row: &'a ColumnBag, column: &str) -> std::result::Result<&'a str, String> {
    optional(row, column).ok_or_else(|| format!("missing required column '{column}'"))
}

/// Parses the timestamp layouts staging loaders produce
///
/// Offsets are dropped and the wall-clock time kept, so a discharge at
/// `23:30-05:00` stays on its local calendar day.
pub fn parse_timestamp(value: &str) -> std::result::Result<NaiveDateTime, String> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.naive_local());
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(ts.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }

    Err(format!("invalid timestamp '{value}'"))
}

/// Year from `1970`, `1970.0` (numeric columns) or a `1970-04-12` birth date
fn parse_year(value: &str) -> std::result::Result<i32, String> {
    if let Ok(year) = value.parse::<i32>() {
        return Ok(year);
    }
    if let Ok(number) = value.parse::<f64>() {
        if number.fract() == 0.0 && number.abs() < 10_000.0 {
            return Ok(number as i32);
        }
    }
    value
        .get(..4)
        .and_then(|y| y.parse::<i32>().ok())
        .filter(|_| value.len() == 4 || value.as_bytes().get(4) == Some(&b'-'))
        .ok_or_else(|| format!("invalid year '{value}'"))
}

fn parse_number(value: &str) -> std::result::Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|_| format!("invalid number '{value}'"))
}

fn parse_amount(value: &str) -> std::result::Result<Amount, String> {
    value.parse::<Amount>()
}

fn fhir_gender_code(gender: &str) -> String {
    match gender.to_lowercase().as_str() {
        "male" => "M".to_string(),
        "female" => "F".to_string(),
        other => other.to_string(),
    }
}

//! PostgreSQL row models
//!
//! Mapping between `tokio_postgres` rows and the staging, run log and
//! warehouse types. Money crosses the wire as integer cents.

use crate::core::runlog::entry::{RunLogEntry, RunStatus};
use crate::core::staging::tables::{ColumnBag, StagingTable};
use crate::domain::ids::{DepartmentId, EncounterId, PatientId, ProviderId, RunId};
use crate::domain::money::Amount;
use crate::domain::warehouse::{
    DepartmentDim, EncounterFact, PatientDim, ProviderDim, TimeDay, WarehouseTable,
};
use crate::domain::{ClinistarError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tokio_postgres::types::FromSql;
use tokio_postgres::Row;

/// Columns of `etl_run_log`, in the order the run log queries return them
pub const RUN_LOG_COLUMNS: &str = "run_id, started_at, finished_at, status, notes";

/// `SELECT` reading a warehouse table back in natural key order
pub fn select_warehouse_sql(table: WarehouseTable) -> &'static str {
    match table {
        WarehouseTable::DimDepartment => {
            "SELECT department_id, department_name FROM dim_department ORDER BY department_id"
        }
        WarehouseTable::DimProvider => {
            "SELECT provider_id, provider_name, department_id FROM dim_provider ORDER BY provider_id"
        }
        WarehouseTable::DimPatient => {
            "SELECT patient_id, birth_year, sex FROM dim_patient ORDER BY patient_id"
        }
        WarehouseTable::DimTime => {
            "SELECT date_key, year, month, day, dow FROM dim_time ORDER BY date_key"
        }
        WarehouseTable::FactEncounter => {
            "SELECT encounter_id, patient_id, provider_id, department_id, admit_date, \
             discharge_date, encounter_type, length_of_stay_days, \
             (total_charges * 100)::BIGINT AS total_cents \
             FROM fact_encounter ORDER BY encounter_id"
        }
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, column: &str) -> Result<T> {
    row.try_get(column)
        .map_err(|e| ClinistarError::Database(format!("Failed to read column '{column}': {e}")))
}

fn key<T>(value: String, parse: impl FnOnce(String) -> std::result::Result<T, String>) -> Result<T> {
    parse(value).map_err(ClinistarError::Database)
}

fn unsigned(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ClinistarError::Database(format!("Negative value {value} in column '{column}'")))
}

/// A staging row read with `select_text_sql`
pub fn column_bag_from_row(table: StagingTable, row: &Row) -> Result<ColumnBag> {
    table
        .columns()
        .iter()
        .map(|column| Ok((column.to_string(), get::<Option<String>>(row, column)?)))
        .collect()
}

pub fn run_log_entry_from_row(row: &Row) -> Result<RunLogEntry> {
    let status: String = get(row, "status")?;
    Ok(RunLogEntry {
        run_id: RunId::new(get(row, "run_id")?),
        started_at: get::<DateTime<Utc>>(row, "started_at")?,
        finished_at: get::<Option<DateTime<Utc>>>(row, "finished_at")?,
        status: status.parse::<RunStatus>().map_err(ClinistarError::State)?,
        notes: get(row, "notes")?,
    })
}

pub fn department_from_row(row: &Row) -> Result<DepartmentDim> {
    Ok(DepartmentDim {
        department_id: key(get(row, "department_id")?, DepartmentId::new)?,
        department_name: get(row, "department_name")?,
    })
}

pub fn provider_from_row(row: &Row) -> Result<ProviderDim> {
    Ok(ProviderDim {
        provider_id: key(get(row, "provider_id")?, ProviderId::new)?,
        provider_name: get(row, "provider_name")?,
        department_id: key(get(row, "department_id")?, DepartmentId::new)?,
    })
}

pub fn patient_from_row(row: &Row) -> Result<PatientDim> {
    Ok(PatientDim {
        patient_id: key(get(row, "patient_id")?, PatientId::new)?,
        birth_year: get(row, "birth_year")?,
        sex: get(row, "sex")?,
    })
}

pub fn time_day_from_row(row: &Row) -> Result<TimeDay> {
    Ok(TimeDay {
        date_key: get::<NaiveDate>(row, "date_key")?,
        year: get(row, "year")?,
        month: unsigned(get(row, "month")?, "month")?,
        day: unsigned(get(row, "day")?, "day")?,
        dow: unsigned(get(row, "dow")?, "dow")?,
    })
}

pub fn fact_from_row(row: &Row) -> Result<EncounterFact> {
    Ok(EncounterFact {
        encounter_id: key(get(row, "encounter_id")?, EncounterId::new)?,
        patient_id: key(get(row, "patient_id")?, PatientId::new)?,
        provider_id: key(get(row, "provider_id")?, ProviderId::new)?,
        department_id: key(get(row, "department_id")?, DepartmentId::new)?,
        admit_date: get(row, "admit_date")?,
        discharge_date: get(row, "discharge_date")?,
        encounter_type: get(row, "encounter_type")?,
        length_of_stay_days: get::<Option<i32>>(row, "length_of_stay_days")?.unwrap_or(0),
        total_charges: Amount::from_cents(get::<Option<i64>>(row, "total_cents")?.unwrap_or(0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_warehouse_reads_cents() {
        let sql = select_warehouse_sql(WarehouseTable::FactEncounter);
        assert!(sql.contains("(total_charges * 100)::BIGINT AS total_cents"));
        assert!(sql.ends_with("ORDER BY encounter_id"));
    }

    #[test]
    fn test_every_table_has_a_select() {
        for table in WarehouseTable::LOAD_ORDER {
            assert!(select_warehouse_sql(table).contains(table.table_name()));
        }
    }
}

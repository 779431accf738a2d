//! Warehouse rows
//!
//! Dimension and fact row types of the star schema, and the
//! [`WarehouseDelta`] the builder hands to the transaction coordinator.

use crate::domain::ids::{DepartmentId, EncounterId, PatientId, ProviderId};
use crate::domain::money::Amount;
use crate::domain::records::EntityKind;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Warehouse tables owned by the transaction coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WarehouseTable {
    DimDepartment,
    DimProvider,
    DimPatient,
    DimTime,
    FactEncounter,
}

impl WarehouseTable {
    /// Order in which tables are truncated: facts before the dimensions they reference
    pub const TRUNCATE_ORDER: [WarehouseTable; 5] = [
        WarehouseTable::FactEncounter,
        WarehouseTable::DimTime,
        WarehouseTable::DimProvider,
        WarehouseTable::DimDepartment,
        WarehouseTable::DimPatient,
    ];

    /// Order in which tables are loaded: referenced tables first
    pub const LOAD_ORDER: [WarehouseTable; 5] = [
        WarehouseTable::DimDepartment,
        WarehouseTable::DimProvider,
        WarehouseTable::DimPatient,
        WarehouseTable::DimTime,
        WarehouseTable::FactEncounter,
    ];

    /// SQL table name
    pub fn table_name(&self) -> &'static str {
        match self {
            WarehouseTable::DimDepartment => "dim_department",
            WarehouseTable::DimProvider => "dim_provider",
            WarehouseTable::DimPatient => "dim_patient",
            WarehouseTable::DimTime => "dim_time",
            WarehouseTable::FactEncounter => "fact_encounter",
        }
    }
}

impl fmt::Display for WarehouseTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatientDim {
    pub patient_id: PatientId,
    pub birth_year: Option<i32>,
    pub sex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderDim {
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub department_id: DepartmentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepartmentDim {
    pub department_id: DepartmentId,
    pub department_name: String,
}

/// One calendar day of the time dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeDay {
    pub date_key: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Day of week, Monday = 0
    pub dow: u32,
}

impl TimeDay {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date_key: date,
            year: date.year(),
            month: date.month(),
            day: date.day(),
            dow: date.weekday().num_days_from_monday(),
        }
    }
}

/// One row per encounter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncounterFact {
    pub encounter_id: EncounterId,
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub department_id: DepartmentId,
    pub admit_date: NaiveDate,
    pub discharge_date: NaiveDate,
    pub encounter_type: Option<String>,
    pub length_of_stay_days: i32,
    pub total_charges: Amount,
}

/// Full content of the warehouse, as derived by the builder or read back
///
/// Every sequence is sorted by natural key, so two deltas built from the
/// same input compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseDelta {
    pub departments: Vec<DepartmentDim>,
    pub providers: Vec<ProviderDim>,
    pub patients: Vec<PatientDim>,
    pub time_days: Vec<TimeDay>,
    pub facts: Vec<EncounterFact>,
}

impl WarehouseDelta {
    /// Row counts per dimension entity kind
    pub fn dimension_counts(&self) -> BTreeMap<EntityKind, usize> {
        BTreeMap::from([
            (EntityKind::Department, self.departments.len()),
            (EntityKind::Provider, self.providers.len()),
            (EntityKind::Patient, self.patients.len()),
            (EntityKind::TimeDay, self.time_days.len()),
        ])
    }

    /// Row count of one table
    pub fn row_count(&self, table: WarehouseTable) -> usize {
        match table {
            WarehouseTable::DimDepartment => self.departments.len(),
            WarehouseTable::DimProvider => self.providers.len(),
            WarehouseTable::DimPatient => self.patients.len(),
            WarehouseTable::DimTime => self.time_days.len(),
            WarehouseTable::FactEncounter => self.facts.len(),
        }
    }

    /// Total rows across all tables
    pub fn total_rows(&self) -> usize {
        WarehouseTable::LOAD_ORDER
            .iter()
            .map(|t| self.row_count(*t))
            .sum()
    }

    /// Sorts every sequence by natural key
    pub fn normalize(&mut self) {
        self.departments
            .sort_by(|a, b| a.department_id.cmp(&b.department_id));
        self.providers.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        self.patients.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        self.time_days.sort_by_key(|d| d.date_key);
        self.facts.sort_by(|a, b| a.encounter_id.cmp(&b.encounter_id));
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }
}

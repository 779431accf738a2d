//! Staged records
//!
//! A [`StagedRecord`] is one raw row from the staging store after it has been
//! decoded into the fixed schema of its entity kind. Records are tagged with
//! their provenance ([`SourceKind`]) and are read-only to the validator and
//! the builder.

use crate::domain::ids::{DepartmentId, EncounterId, PatientId, ProviderId};
use crate::domain::money::Amount;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream mode a staged row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic CSV extracts loaded into `stg_*` tables
    Csv,
    /// FHIR bundles ingested into `stg_fhir_*` tables
    Fhir,
}

impl SourceKind {
    /// Staging table prefix for this provenance
    pub fn table_prefix(&self) -> &'static str {
        match self {
            SourceKind::Csv => "stg_",
            SourceKind::Fhir => "stg_fhir_",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Csv => f.write_str("csv"),
            SourceKind::Fhir => f.write_str("fhir"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SourceKind::Csv),
            "fhir" => Ok(SourceKind::Fhir),
            other => Err(format!("Unknown source kind '{other}'. Must be csv or fhir")),
        }
    }
}

/// Entity kind of a staged record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Patient,
    Provider,
    Department,
    Encounter,
    Charge,
    Lab,
    /// Calendar day of the time dimension (derived, never staged)
    TimeDay,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Patient => "patient",
            EntityKind::Provider => "provider",
            EntityKind::Department => "department",
            EntityKind::Encounter => "encounter",
            EntityKind::Charge => "charge",
            EntityKind::Lab => "lab",
            EntityKind::TimeDay => "time_day",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient_id: PatientId,
    pub birth_year: Option<i32>,
    pub sex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub department_id: DepartmentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentRecord {
    pub department_id: DepartmentId,
    pub department_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterRecord {
    pub encounter_id: EncounterId,
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub department_id: DepartmentId,
    pub admit_ts: NaiveDateTime,
    pub discharge_ts: NaiveDateTime,
    pub encounter_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub charge_id: String,
    pub encounter_id: EncounterId,
    pub amount: Amount,
    /// CPT code
    pub code: Option<String>,
    pub posted_ts: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRecord {
    pub lab_id: String,
    pub encounter_id: EncounterId,
    /// LOINC code
    pub code: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub result_ts: Option<NaiveDateTime>,
}

/// Typed payload of a staged row, one variant per entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_kind", rename_all = "lowercase")]
pub enum StagedPayload {
    Patient(PatientRecord),
    Provider(ProviderRecord),
    Department(DepartmentRecord),
    Encounter(EncounterRecord),
    Charge(ChargeRecord),
    Lab(LabRecord),
}

/// A provenance-tagged staged row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRecord {
    pub source_kind: SourceKind,
    pub payload: StagedPayload,
}

impl StagedRecord {
    pub fn new(source_kind: SourceKind, payload: StagedPayload) -> Self {
        Self {
            source_kind,
            payload,
        }
    }

    /// Entity kind of the payload
    pub fn entity_kind(&self) -> EntityKind {
        match &self.payload {
            StagedPayload::Patient(_) => EntityKind::Patient,
            StagedPayload::Provider(_) => EntityKind::Provider,
            StagedPayload::Department(_) => EntityKind::Department,
            StagedPayload::Encounter(_) => EntityKind::Encounter,
            StagedPayload::Charge(_) => EntityKind::Charge,
            StagedPayload::Lab(_) => EntityKind::Lab,
        }
    }

    /// Natural key of the payload
    pub fn natural_key(&self) -> &str {
        match &self.payload {
            StagedPayload::Patient(p) => p.patient_id.as_str(),
            StagedPayload::Provider(p) => p.provider_id.as_str(),
            StagedPayload::Department(d) => d.department_id.as_str(),
            StagedPayload::Encounter(e) => e.encounter_id.as_str(),
            StagedPayload::Charge(c) => &c.charge_id,
            StagedPayload::Lab(l) => &l.lab_id,
        }
    }
}

/// An ordered collection of staged records, in staging-table order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagedBatch {
    records: Vec<StagedRecord>,
}

impl StagedBatch {
    pub fn new(records: Vec<StagedRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, source_kind: SourceKind, payload: StagedPayload) {
        self.records.push(StagedRecord::new(source_kind, payload));
    }

    /// Appends another batch, keeping order (this batch's rows first)
    pub fn extend(&mut self, other: StagedBatch) {
        self.records.extend(other.records);
    }

    pub fn records(&self) -> &[StagedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records of one entity kind
    pub fn count(&self, kind: EntityKind) -> usize {
        self.records
            .iter()
            .filter(|r| r.entity_kind() == kind)
            .count()
    }

    /// Source kinds present in the batch, sorted
    pub fn source_kinds(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<SourceKind> = self.records.iter().map(|r| r.source_kind).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn patients(&self) -> impl Iterator<Item = &PatientRecord> {
        self.records.iter().filter_map(|r| match &r.payload {
            StagedPayload::Patient(p) => Some(p),
            _ => None,
        })
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderRecord> {
        self.records.iter().filter_map(|r| match &r.payload {
            StagedPayload::Provider(p) => Some(p),
            _ => None,
        })
    }

    pub fn departments(&self) -> impl Iterator<Item = &DepartmentRecord> {
        self.records.iter().filter_map(|r| match &r.payload {
            StagedPayload::Department(d) => Some(d),
            _ => None,
        })
    }

    pub fn encounters(&self) -> impl Iterator<Item = &EncounterRecord> {
        self.records.iter().filter_map(|r| match &r.payload {
            StagedPayload::Encounter(e) => Some(e),
            _ => None,
        })
    }

    pub fn charges(&self) -> impl Iterator<Item = &ChargeRecord> {
        self.records.iter().filter_map(|r| match &r.payload {
            StagedPayload::Charge(c) => Some(c),
            _ => None,
        })
    }

    pub fn labs(&self) -> impl Iterator<Item = &LabRecord> {
        self.records.iter().filter_map(|r| match &r.payload {
            StagedPayload::Lab(l) => Some(l),
            _ => None,
        })
    }
}

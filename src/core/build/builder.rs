//! Warehouse builder
//!
//! Derives the full star-schema content from validated staged records. The
//! builder is pure: it reads the batch and returns a [`WarehouseDelta`] or a
//! [`BuildAborted`], never a partial result.

use crate::core::build::sources::{department_candidates, provider_candidates};
use crate::core::validation::ValidatedRecords;
use crate::domain::errors::{BuildAborted, BuildStage};
use crate::domain::ids::{DepartmentId, EncounterId, PatientId, ProviderId};
use crate::domain::money::Amount;
use crate::domain::records::{EntityKind, StagedBatch};
use crate::domain::warehouse::{
    DepartmentDim, EncounterFact, PatientDim, ProviderDim, TimeDay, WarehouseDelta,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// Builds the warehouse delta from records that passed validation
///
/// Dimension rows are deduplicated by natural key with the first occurrence
/// winning. Every fact foreign key is resolved against the derived
/// dimensions; a miss aborts the build.
///
/// # Errors
///
/// Returns [`BuildAborted`] when a key cannot be resolved or a metric comes
/// out negative or overflows.
pub fn build(validated: &ValidatedRecords<'_>) -> Result<WarehouseDelta, BuildAborted> {
    let batch = validated.batch();

    let departments = derive_departments(batch);
    let providers = derive_providers(batch);
    let patients = derive_patients(batch);
    let time_days = derive_time_days(batch);

    // Provider department references resolve like fact keys do
    for provider in providers.values() {
        if !departments.contains_key(&provider.department_id) {
            return Err(BuildAborted::new(
                BuildStage::KeyResolution,
                EntityKind::Department,
                provider.department_id.as_str(),
                format!(
                    "provider '{}' references a department with no dimension row",
                    provider.provider_id
                ),
            ));
        }
    }

    let totals = charge_totals(batch)?;
    let mut facts: BTreeMap<&EncounterId, EncounterFact> = BTreeMap::new();

    for encounter in batch.encounters() {
        if facts.contains_key(&encounter.encounter_id) {
            return Err(BuildAborted::new(
                BuildStage::DimensionDerivation,
                EntityKind::Encounter,
                encounter.encounter_id.as_str(),
                "encounter appears more than once",
            ));
        }

        let admit_date = encounter.admit_ts.date();
        let discharge_date = encounter.discharge_ts.date();

        resolve(&patients, &encounter.patient_id, EntityKind::Patient)?;
        resolve(&providers, &encounter.provider_id, EntityKind::Provider)?;
        resolve(&departments, &encounter.department_id, EntityKind::Department)?;
        resolve(&time_days, &admit_date, EntityKind::TimeDay)?;
        resolve(&time_days, &discharge_date, EntityKind::TimeDay)?;

        let length_of_stay = (discharge_date - admit_date).num_days();
        if length_of_stay < 0 {
            return Err(BuildAborted::new(
                BuildStage::MetricComputation,
                EntityKind::Encounter,
                encounter.encounter_id.as_str(),
                format!("negative length of stay ({length_of_stay} days)"),
            ));
        }
        let length_of_stay_days = i32::try_from(length_of_stay).map_err(|_| {
            BuildAborted::new(
                BuildStage::MetricComputation,
                EntityKind::Encounter,
                encounter.encounter_id.as_str(),
                format!("length of stay out of range ({length_of_stay} days)"),
            )
        })?;

        let total_charges = totals
            .get(&encounter.encounter_id)
            .copied()
            .unwrap_or(Amount::ZERO);
        if total_charges.is_negative() {
            return Err(BuildAborted::new(
                BuildStage::MetricComputation,
                EntityKind::Encounter,
                encounter.encounter_id.as_str(),
                format!("negative total charges ({total_charges})"),
            ));
        }

        facts.insert(
            &encounter.encounter_id,
            EncounterFact {
                encounter_id: encounter.encounter_id.clone(),
                patient_id: encounter.patient_id.clone(),
                provider_id: encounter.provider_id.clone(),
                department_id: encounter.department_id.clone(),
                admit_date,
                discharge_date,
                encounter_type: encounter.encounter_type.clone(),
                length_of_stay_days,
                total_charges,
            },
        );
    }

    let mut delta = WarehouseDelta {
        departments: departments.into_values().collect(),
        providers: providers.into_values().collect(),
        patients: patients.into_values().collect(),
        time_days: time_days.into_values().collect(),
        facts: facts.into_values().collect(),
    };
    delta.normalize();

    tracing::info!(
        departments = delta.departments.len(),
        providers = delta.providers.len(),
        patients = delta.patients.len(),
        time_days = delta.time_days.len(),
        facts = delta.facts.len(),
        "Warehouse delta derived"
    );

    Ok(delta)
}

fn resolve<K, V>(
    dimension: &BTreeMap<K, V>,
    key: &K,
    entity_kind: EntityKind,
) -> Result<(), BuildAborted>
where
    K: Ord + std::fmt::Display,
{
    if dimension.contains_key(key) {
        Ok(())
    } else {
        Err(BuildAborted::new(
            BuildStage::KeyResolution,
            entity_kind,
            key.to_string(),
            "no matching dimension row",
        ))
    }
}

fn derive_departments(batch: &StagedBatch) -> BTreeMap<DepartmentId, DepartmentDim> {
    let mut departments = BTreeMap::new();
    for candidate in department_candidates(batch) {
        departments
            .entry(candidate.department_id.clone())
            .or_insert_with(|| DepartmentDim {
                department_id: candidate.department_id.clone(),
                department_name: candidate
                    .department_name
                    .unwrap_or(candidate.department_id.as_str())
                    .to_string(),
            });
    }
    departments
}

fn derive_providers(batch: &StagedBatch) -> BTreeMap<ProviderId, ProviderDim> {
    let mut providers = BTreeMap::new();
    for candidate in provider_candidates(batch) {
        providers
            .entry(candidate.provider_id.clone())
            .or_insert_with(|| ProviderDim {
                provider_id: candidate.provider_id.clone(),
                provider_name: candidate
                    .provider_name
                    .unwrap_or(candidate.provider_id.as_str())
                    .to_string(),
                department_id: candidate.department_id.clone(),
            });
    }
    providers
}

/// Patients come only from patient records
fn derive_patients(batch: &StagedBatch) -> BTreeMap<PatientId, PatientDim> {
    let mut patients = BTreeMap::new();
    for record in batch.patients() {
        patients
            .entry(record.patient_id.clone())
            .or_insert_with(|| PatientDim {
                patient_id: record.patient_id.clone(),
                birth_year: record.birth_year,
                sex: record.sex.clone(),
            });
    }
    patients
}

fn derive_time_days(batch: &StagedBatch) -> BTreeMap<NaiveDate, TimeDay> {
    let mut days = BTreeMap::new();
    for encounter in batch.encounters() {
        for date in [encounter.admit_ts.date(), encounter.discharge_ts.date()] {
            days.entry(date).or_insert_with(|| TimeDay::from_date(date));
        }
    }
    days
}

fn charge_totals(batch: &StagedBatch) -> Result<HashMap<&EncounterId, Amount>, BuildAborted> {
    let mut totals: HashMap<&EncounterId, Amount> = HashMap::new();
    for charge in batch.charges() {
        let total = totals.entry(&charge.encounter_id).or_insert(Amount::ZERO);
        *total = total.checked_add(charge.amount).ok_or_else(|| {
            BuildAborted::new(
                BuildStage::MetricComputation,
                EntityKind::Encounter,
                charge.encounter_id.as_str(),
                format!("total charges overflow at charge '{}'", charge.charge_id),
            )
        })?;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validation::{validate, RuleCatalog, ValidationResult};
    use crate::domain::records::{
        ChargeRecord, DepartmentRecord, EncounterRecord, PatientRecord, ProviderRecord,
        SourceKind, StagedPayload,
    };
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn patient(id: &str, birth_year: i32) -> StagedPayload {
        StagedPayload::Patient(PatientRecord {
            patient_id: PatientId::new(id).unwrap(),
            birth_year: Some(birth_year),
            sex: Some("F".to_string()),
        })
    }

    fn encounter(id: &str, patient: &str, admit: &str, discharge: &str) -> StagedPayload {
        StagedPayload::Encounter(EncounterRecord {
            encounter_id: EncounterId::new(id).unwrap(),
            patient_id: PatientId::new(patient).unwrap(),
            provider_id: ProviderId::new("PRV0001").unwrap(),
            department_id: DepartmentId::new("CARD").unwrap(),
            admit_ts: ts(admit),
            discharge_ts: ts(discharge),
            encounter_type: Some("inpatient".to_string()),
        })
    }

    fn charge(id: &str, encounter: &str, cents: i64) -> StagedPayload {
        StagedPayload::Charge(ChargeRecord {
            charge_id: id.to_string(),
            encounter_id: EncounterId::new(encounter).unwrap(),
            amount: Amount::from_cents(cents),
            code: Some("99213".to_string()),
            posted_ts: None,
        })
    }

    fn batch(payloads: Vec<StagedPayload>) -> StagedBatch {
        let mut batch = StagedBatch::default();
        for p in payloads {
            batch.push(SourceKind::Csv, p);
        }
        batch
    }

    fn build_batch(batch: &StagedBatch) -> Result<WarehouseDelta, BuildAborted> {
        let result = validate(batch, &RuleCatalog::default());
        let validated = ValidatedRecords::accept(batch, &result).unwrap();
        build(&validated)
    }

    #[test]
    fn test_length_of_stay_and_total_charges() {
        let batch = batch(vec![
            patient("P1", 1970),
            encounter("E1", "P1", "2024-01-01 08:00", "2024-01-04 10:00"),
            charge("C1", "E1", 10_000),
            charge("C2", "E1", 5_000),
        ]);

        let delta = build_batch(&batch).unwrap();
        assert_eq!(delta.facts.len(), 1);
        let fact = &delta.facts[0];
        assert_eq!(fact.length_of_stay_days, 3);
        assert_eq!(fact.total_charges, Amount::from_cents(15_000));
        assert_eq!(delta.time_days.len(), 2);
    }

    #[test]
    fn test_encounter_without_charges_totals_zero() {
        let batch = batch(vec![
            patient("P1", 1970),
            encounter("E1", "P1", "2024-01-01 08:00", "2024-01-01 17:00"),
        ]);

        let delta = build_batch(&batch).unwrap();
        assert_eq!(delta.facts[0].total_charges, Amount::ZERO);
        assert_eq!(delta.facts[0].length_of_stay_days, 0);
        assert_eq!(delta.time_days.len(), 1);
    }

    #[test]
    fn test_derived_dimensions_default_names_to_id() {
        let batch = batch(vec![
            patient("P1", 1970),
            encounter("E1", "P1", "2024-01-01 08:00", "2024-01-02 08:00"),
        ]);

        let delta = build_batch(&batch).unwrap();
        assert_eq!(delta.providers[0].provider_name, "PRV0001");
        assert_eq!(delta.providers[0].department_id.as_str(), "CARD");
        assert_eq!(delta.departments[0].department_name, "CARD");
    }

    #[test]
    fn test_explicit_records_win_over_derived() {
        let batch = batch(vec![
            StagedPayload::Department(DepartmentRecord {
                department_id: DepartmentId::new("CARD").unwrap(),
                department_name: "Cardiology".to_string(),
            }),
            StagedPayload::Provider(ProviderRecord {
                provider_id: ProviderId::new("PRV0001").unwrap(),
                provider_name: "Dr. Smith".to_string(),
                department_id: DepartmentId::new("CARD").unwrap(),
            }),
            patient("P1", 1970),
            encounter("E1", "P1", "2024-01-01 08:00", "2024-01-02 08:00"),
        ]);

        let delta = build_batch(&batch).unwrap();
        assert_eq!(delta.departments.len(), 1);
        assert_eq!(delta.departments[0].department_name, "Cardiology");
        assert_eq!(delta.providers[0].provider_name, "Dr. Smith");
    }

    #[test]
    fn test_total_charges_overflow_aborts() {
        let batch = batch(vec![
            patient("P1", 1970),
            encounter("E1", "P1", "2024-01-01 08:00", "2024-01-02 08:00"),
            charge("C1", "E1", i64::MAX),
            charge("C2", "E1", 100),
        ]);

        let err = build_batch(&batch).unwrap_err();
        assert_eq!(err.stage, BuildStage::MetricComputation);
        assert_eq!(err.entity_kind, EntityKind::Encounter);
        assert_eq!(err.key, "E1");
        assert!(err.reason.contains("C2"));
    }

    #[test]
    fn test_missing_patient_aborts_key_resolution() {
        let batch = batch(vec![encounter(
            "E1",
            "P404",
            "2024-01-01 08:00",
            "2024-01-02 08:00",
        )]);

        let err = build_batch(&batch).unwrap_err();
        assert_eq!(err.stage, BuildStage::KeyResolution);
        assert_eq!(err.entity_kind, EntityKind::Patient);
        assert_eq!(err.key, "P404");
    }

    #[test]
    fn test_provider_with_unknown_department_aborts() {
        let batch = batch(vec![
            StagedPayload::Provider(ProviderRecord {
                provider_id: ProviderId::new("PRV0002").unwrap(),
                provider_name: "Dr. Jones".to_string(),
                department_id: DepartmentId::new("ONC").unwrap(),
            }),
            patient("P1", 1970),
            encounter("E1", "P1", "2024-01-01 08:00", "2024-01-02 08:00"),
        ]);

        let err = build_batch(&batch).unwrap_err();
        assert_eq!(err.stage, BuildStage::KeyResolution);
        assert_eq!(err.entity_kind, EntityKind::Department);
        assert_eq!(err.key, "ONC");
    }

    #[test]
    fn test_output_is_sorted_and_deterministic() {
        let batch = batch(vec![
            patient("P2", 1980),
            patient("P1", 1970),
            encounter("E2", "P2", "2024-02-01 08:00", "2024-02-03 08:00"),
            encounter("E1", "P1", "2024-01-01 08:00", "2024-01-02 08:00"),
        ]);

        let first = build_batch(&batch).unwrap();
        let second = build_batch(&batch).unwrap();
        assert_eq!(first, second);

        let ids: Vec<&str> = first.facts.iter().map(|f| f.encounter_id.as_str()).collect();
        assert_eq!(ids, vec!["E1", "E2"]);
        let patients: Vec<&str> = first.patients.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(patients, vec!["P1", "P2"]);
    }

    #[test]
    fn test_failed_validation_cannot_build() {
        let batch = batch(vec![charge("C1", "E1", -100)]);
        let result: ValidationResult = validate(&batch, &RuleCatalog::default());
        assert!(ValidatedRecords::accept(&batch, &result).is_err());
    }
}

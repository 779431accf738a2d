//! Post-commit verification
//!
//! Reads the committed warehouse back, compares its fingerprint with the
//! delta that was committed, and checks that every fact foreign key
//! resolves to exactly one dimension row.

use crate::adapters::database::traits::WarehouseStore;
use crate::core::verification::checksum::fingerprint;
use crate::core::verification::report::{VerificationFailure, VerificationReport};
use crate::domain::records::EntityKind;
use crate::domain::warehouse::{WarehouseDelta, WarehouseTable};
use crate::domain::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

/// Verifier for committed warehouse content
pub struct Verifier {
    store: Arc<dyn WarehouseStore + Send + Sync>,
}

impl Verifier {
    pub fn new(store: Arc<dyn WarehouseStore + Send + Sync>) -> Self {
        Self { store }
    }

    /// Verify the warehouse against the delta that was committed
    ///
    /// # Errors
    ///
    /// Returns an error if the warehouse cannot be read back.
    pub async fn verify(&self, committed: &WarehouseDelta) -> Result<VerificationReport> {
        let start = Instant::now();

        tracing::info!(rows = committed.total_rows(), "Starting post-commit verification");

        let actual = self.store.read_warehouse().await?;
        let report = VerificationReport {
            verified_at: Utc::now(),
            expected_fingerprint: fingerprint(committed)?,
            actual_fingerprint: fingerprint(&actual)?,
            row_counts: WarehouseTable::LOAD_ORDER
                .iter()
                .map(|t| (*t, actual.row_count(*t)))
                .collect(),
            failures: referential_completeness(&actual),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if report.is_success() {
            tracing::info!(duration_ms = report.duration_ms, "Verification passed");
        } else {
            tracing::error!(
                fingerprint_matches = report.fingerprint_matches(),
                unresolved_keys = report.failures.len(),
                "Verification failed"
            );
        }

        Ok(report)
    }
}

fn key_counts<'a, K: Eq + Hash + 'a>(keys: impl Iterator<Item = &'a K>) -> HashMap<&'a K, usize> {
    let mut counts = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Fact and provider foreign keys that don't resolve to exactly one row
pub fn referential_completeness(delta: &WarehouseDelta) -> Vec<VerificationFailure> {
    let patients = key_counts(delta.patients.iter().map(|p| &p.patient_id));
    let providers = key_counts(delta.providers.iter().map(|p| &p.provider_id));
    let departments = key_counts(delta.departments.iter().map(|d| &d.department_id));
    let days = key_counts(delta.time_days.iter().map(|d| &d.date_key));

    let mut failures = Vec::new();
    let mut check = |encounter_id: &str, entity_kind: EntityKind, key: String, matches: usize| {
        if matches != 1 {
            failures.push(VerificationFailure {
                encounter_id: encounter_id.to_string(),
                entity_kind,
                key,
                matches,
            });
        }
    };

    for fact in &delta.facts {
        let id = fact.encounter_id.as_str();
        let count = |n: Option<&usize>| n.copied().unwrap_or(0);
        check(id, EntityKind::Patient, fact.patient_id.to_string(), count(patients.get(&fact.patient_id)));
        check(id, EntityKind::Provider, fact.provider_id.to_string(), count(providers.get(&fact.provider_id)));
        check(
            id,
            EntityKind::Department,
            fact.department_id.to_string(),
            count(departments.get(&fact.department_id)),
        );
        check(id, EntityKind::TimeDay, fact.admit_date.to_string(), count(days.get(&fact.admit_date)));
        check(
            id,
            EntityKind::TimeDay,
            fact.discharge_date.to_string(),
            count(days.get(&fact.discharge_date)),
        );
    }

    for provider in &delta.providers {
        // Provider rows have no encounter; the provider id stands in
        check(
            provider.provider_id.as_str(),
            EntityKind::Department,
            provider.department_id.to_string(),
            departments.get(&provider.department_id).copied().unwrap_or(0),
        );
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{DepartmentId, EncounterId, PatientId, ProviderId};
    use crate::domain::money::Amount;
    use crate::domain::warehouse::{DepartmentDim, EncounterFact, PatientDim, ProviderDim, TimeDay};
    use chrono::NaiveDate;

    fn delta() -> WarehouseDelta {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        WarehouseDelta {
            departments: vec![DepartmentDim {
                department_id: DepartmentId::new("ED").unwrap(),
                department_name: "ED".to_string(),
            }],
            providers: vec![ProviderDim {
                provider_id: ProviderId::new("PRV1").unwrap(),
                provider_name: "PRV1".to_string(),
                department_id: DepartmentId::new("ED").unwrap(),
            }],
            patients: vec![PatientDim {
                patient_id: PatientId::new("P1").unwrap(),
                birth_year: None,
                sex: None,
            }],
            time_days: vec![TimeDay::from_date(day)],
            facts: vec![EncounterFact {
                encounter_id: EncounterId::new("E1").unwrap(),
                patient_id: PatientId::new("P1").unwrap(),
                provider_id: ProviderId::new("PRV1").unwrap(),
                department_id: DepartmentId::new("ED").unwrap(),
                admit_date: day,
                discharge_date: day,
                encounter_type: None,
                length_of_stay_days: 0,
                total_charges: Amount::ZERO,
            }],
        }
    }

    #[test]
    fn test_complete_delta_has_no_failures() {
        assert!(referential_completeness(&delta()).is_empty());
    }

    #[test]
    fn test_missing_and_duplicate_dimension_rows() {
        let mut broken = delta();
        broken.patients.clear();
        let extra_day = broken.time_days[0].clone();
        broken.time_days.push(extra_day);

        let failures = referential_completeness(&broken);
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].entity_kind, EntityKind::Patient);
        assert_eq!(failures[0].matches, 0);
        assert!(failures[1..]
            .iter()
            .all(|f| f.entity_kind == EntityKind::TimeDay && f.matches == 2));
    }
}

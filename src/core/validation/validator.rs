//! Rule evaluation
//!
//! [`validate`] runs every rule of the catalog over the staged batch, even
//! after an earlier rule has found fatal issues, so that one run reports
//! every defect. Nothing here touches a store.

use crate::core::build::sources::{department_candidates, provider_candidates};
use crate::core::validation::issue::{ValidationIssue, ValidationResult};
use crate::core::validation::rules::{RuleCatalog, RuleId, Severity};
use crate::domain::ids::EncounterId;
use crate::domain::records::{EntityKind, StagedBatch};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Validates a staged batch against a rule catalog
///
/// Issues are ordered by rule evaluation order, then by entity kind and
/// natural key, so reports from identical input are identical.
///
/// # Examples
///
/// ```
/// use clinistar::core::validation::{validate, RuleCatalog};
/// use clinistar::domain::StagedBatch;
///
/// let result = validate(&StagedBatch::default(), &RuleCatalog::default());
/// assert!(result.passed);
/// ```
pub fn validate(staged: &StagedBatch, rules: &RuleCatalog) -> ValidationResult {
    let mut issues = Vec::new();

    for rule in rules.rules() {
        let mut found = match rule.id {
            RuleId::DuplicateKey => check_duplicate_keys(staged, rule.severity),
            RuleId::FinancialValidity => check_financial_validity(staged, rule.severity),
            RuleId::TemporalConsistency => check_temporal_consistency(staged, rule.severity),
            RuleId::ReferentialIntegrity => check_referential_integrity(staged, rule.severity),
            RuleId::DimensionConflict => check_dimension_conflicts(staged, rule.severity),
        };

        found.sort_by(|a, b| {
            a.entity_kind
                .cmp(&b.entity_kind)
                .then_with(|| a.keys.cmp(&b.keys))
        });

        tracing::debug!(
            rule = %rule.id,
            severity = %rule.severity,
            issues = found.len(),
            "Evaluated validation rule"
        );

        issues.extend(found);
    }

    let result = ValidationResult::from_issues(issues);

    tracing::info!(
        records = staged.len(),
        passed = result.passed,
        fatal = result.fatal_count(),
        warnings = result.warning_count(),
        "Validation completed"
    );

    result
}

fn issue(
    rule_id: RuleId,
    severity: Severity,
    entity_kind: EntityKind,
    keys: Vec<String>,
    message: String,
) -> ValidationIssue {
    ValidationIssue {
        rule_id,
        severity,
        entity_kind,
        keys,
        message,
    }
}

/// Counts keys, keeping them sorted for deterministic output
fn repeated<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    counts.into_iter().filter(|(_, n)| *n > 1).collect()
}

fn check_duplicate_keys(staged: &StagedBatch, severity: Severity) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    // Only the patient dimension source counts: a patient referenced by many
    // encounters is not a duplicate.
    for (key, n) in repeated(staged.patients().map(|p| p.patient_id.as_str())) {
        issues.push(issue(
            RuleId::DuplicateKey,
            severity,
            EntityKind::Patient,
            vec![key.to_string()],
            format!("patient_id '{key}' appears {n} times in patient records"),
        ));
    }

    for (key, n) in repeated(staged.encounters().map(|e| e.encounter_id.as_str())) {
        issues.push(issue(
            RuleId::DuplicateKey,
            severity,
            EntityKind::Encounter,
            vec![key.to_string()],
            format!("encounter_id '{key}' appears {n} times in encounter records"),
        ));
    }

    issues
}

fn check_financial_validity(staged: &StagedBatch, severity: Severity) -> Vec<ValidationIssue> {
    staged
        .charges()
        .filter(|c| c.amount.is_negative())
        .map(|c| {
            issue(
                RuleId::FinancialValidity,
                severity,
                EntityKind::Charge,
                vec![c.charge_id.clone(), c.encounter_id.to_string()],
                format!(
                    "charge '{}' on encounter '{}' has negative amount {}",
                    c.charge_id, c.encounter_id, c.amount
                ),
            )
        })
        .collect()
}

fn check_temporal_consistency(staged: &StagedBatch, severity: Severity) -> Vec<ValidationIssue> {
    staged
        .encounters()
        .filter(|e| e.discharge_ts < e.admit_ts)
        .map(|e| {
            issue(
                RuleId::TemporalConsistency,
                severity,
                EntityKind::Encounter,
                vec![e.encounter_id.to_string()],
                format!(
                    "encounter '{}' discharged at {} before admission at {}",
                    e.encounter_id, e.discharge_ts, e.admit_ts
                ),
            )
        })
        .collect()
}

fn check_referential_integrity(staged: &StagedBatch, severity: Severity) -> Vec<ValidationIssue> {
    let encounters: HashSet<&EncounterId> = staged.encounters().map(|e| &e.encounter_id).collect();

    let charges = staged
        .charges()
        .filter(|c| !encounters.contains(&c.encounter_id))
        .map(|c| {
            issue(
                RuleId::ReferentialIntegrity,
                severity,
                EntityKind::Charge,
                vec![c.charge_id.clone(), c.encounter_id.to_string()],
                format!(
                    "charge '{}' references missing encounter '{}'",
                    c.charge_id, c.encounter_id
                ),
            )
        });

    let labs = staged
        .labs()
        .filter(|l| !encounters.contains(&l.encounter_id))
        .map(|l| {
            issue(
                RuleId::ReferentialIntegrity,
                severity,
                EntityKind::Lab,
                vec![l.lab_id.clone(), l.encounter_id.to_string()],
                format!(
                    "lab '{}' references missing encounter '{}'",
                    l.lab_id, l.encounter_id
                ),
            )
        });

    charges.chain(labs).collect()
}

fn check_dimension_conflicts(staged: &StagedBatch, severity: Severity) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    // provider_id -> (first name, first department, conflicting descriptions)
    let mut providers: HashMap<&str, (Option<&str>, &str, Vec<String>)> = HashMap::new();
    for candidate in provider_candidates(staged) {
        let department = candidate.department_id.as_str();
        match providers.get_mut(candidate.provider_id.as_str()) {
            None => {
                providers.insert(
                    candidate.provider_id.as_str(),
                    (candidate.provider_name, department, Vec::new()),
                );
            }
            Some((first_name, first_department, conflicts)) => {
                if department != *first_department {
                    let desc = format!("department '{department}'");
                    if !conflicts.contains(&desc) {
                        conflicts.push(desc);
                    }
                }
                if let (Some(first), Some(name)) = (*first_name, candidate.provider_name) {
                    if first != name {
                        let desc = format!("name '{name}'");
                        if !conflicts.contains(&desc) {
                            conflicts.push(desc);
                        }
                    }
                } else if first_name.is_none() && candidate.provider_name.is_some() {
                    *first_name = candidate.provider_name;
                }
            }
        }
    }

    for (provider_id, (_, first_department, conflicts)) in providers {
        if conflicts.is_empty() {
            continue;
        }
        issues.push(issue(
            RuleId::DimensionConflict,
            severity,
            EntityKind::Provider,
            vec![provider_id.to_string()],
            format!(
                "provider '{provider_id}' first staged in department '{first_department}', \
                 later rows with {} are ignored",
                conflicts.join(", ")
            ),
        ));
    }

    let mut departments: HashMap<&str, (&str, Vec<String>)> = HashMap::new();
    for candidate in department_candidates(staged) {
        let Some(name) = candidate.department_name else {
            continue;
        };
        match departments.get_mut(candidate.department_id.as_str()) {
            None => {
                departments.insert(candidate.department_id.as_str(), (name, Vec::new()));
            }
            Some((first_name, conflicts)) => {
                if name != *first_name && !conflicts.iter().any(|c| c == name) {
                    conflicts.push(name.to_string());
                }
            }
        }
    }

    for (department_id, (first_name, conflicts)) in departments {
        if conflicts.is_empty() {
            continue;
        }
        issues.push(issue(
            RuleId::DimensionConflict,
            severity,
            EntityKind::Department,
            vec![department_id.to_string()],
            format!(
                "department '{department_id}' first staged as '{first_name}', \
                 later names '{}' are ignored",
                conflicts.join("', '")
            ),
        ));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{DepartmentId, PatientId, ProviderId};
    use crate::domain::money::Amount;
    use crate::domain::records::{
        ChargeRecord, EncounterRecord, LabRecord, PatientRecord, ProviderRecord, SourceKind,
        StagedPayload,
    };
    use chrono::NaiveDate;

    fn ts(day: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn encounter(id: &str, admit: u32, discharge: u32) -> StagedPayload {
        StagedPayload::Encounter(EncounterRecord {
            encounter_id: EncounterId::new(id).unwrap(),
            patient_id: PatientId::new("PAT1").unwrap(),
            provider_id: ProviderId::new("PRV1").unwrap(),
            department_id: DepartmentId::new("ED").unwrap(),
            admit_ts: ts(admit),
            discharge_ts: ts(discharge),
            encounter_type: None,
        })
    }

    fn charge(id: &str, encounter_id: &str, cents: i64) -> StagedPayload {
        StagedPayload::Charge(ChargeRecord {
            charge_id: id.to_string(),
            encounter_id: EncounterId::new(encounter_id).unwrap(),
            amount: Amount::from_cents(cents),
            code: None,
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

    #[test]
    fn test_all_rules_run_after_fatal() {
        let staged = batch(vec![
            encounter("ENC1", 1, 3),
            encounter("ENC1", 1, 3),
            encounter("ENC2", 5, 4),
            charge("CHG1", "ENC1", -100),
            charge("CHG2", "ENC99", 100),
        ]);

        let result = validate(&staged, &RuleCatalog::default());
        assert!(!result.passed);

        let rules: Vec<RuleId> = result.issues.iter().map(|i| i.rule_id).collect();
        assert_eq!(
            rules,
            vec![
                RuleId::DuplicateKey,
                RuleId::FinancialValidity,
                RuleId::TemporalConsistency,
                RuleId::ReferentialIntegrity,
            ]
        );
    }

    #[test]
    fn test_patient_in_many_encounters_is_not_duplicate() {
        // Both encounters reference PAT1; only one patient record exists
        let staged = batch(vec![
            StagedPayload::Patient(PatientRecord {
                patient_id: PatientId::new("PAT1").unwrap(),
                birth_year: None,
                sex: None,
            }),
            encounter("ENC1", 1, 2),
            encounter("ENC2", 3, 4),
        ]);

        let result = validate(&staged, &RuleCatalog::default());
        assert!(result.passed);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_lab_with_missing_encounter() {
        let staged = batch(vec![
            encounter("ENC1", 1, 2),
            StagedPayload::Lab(LabRecord {
                lab_id: "LAB1".to_string(),
                encounter_id: EncounterId::new("ENC7").unwrap(),
                code: Some("718-7".to_string()),
                value: Some(13.2),
                unit: Some("g/dL".to_string()),
                result_ts: None,
            }),
        ]);

        let result = validate(&staged, &RuleCatalog::default());
        assert!(!result.passed);
        assert_eq!(result.issues[0].entity_kind, EntityKind::Lab);
        assert_eq!(result.issues[0].keys, vec!["LAB1", "ENC7"]);
    }

    #[test]
    fn test_provider_department_conflict_is_warning() {
        let staged = batch(vec![
            StagedPayload::Provider(ProviderRecord {
                provider_id: ProviderId::new("PRV1").unwrap(),
                provider_name: "Provider 01".to_string(),
                department_id: DepartmentId::new("ICU").unwrap(),
            }),
            encounter("ENC1", 1, 2),
        ]);

        let result = validate(&staged, &RuleCatalog::default());
        assert!(result.passed);
        assert_eq!(result.warning_count(), 1);
        let warning = &result.issues[0];
        assert_eq!(warning.rule_id, RuleId::DimensionConflict);
        assert!(warning.message.contains("department 'ED'"));
    }

    #[test]
    fn test_issue_order_within_rule_is_by_key() {
        let staged = batch(vec![
            encounter("ENC3", 5, 4),
            encounter("ENC1", 5, 4),
            encounter("ENC2", 5, 4),
        ]);

        let result = validate(&staged, &RuleCatalog::default());
        let keys: Vec<&str> = result
            .issues
            .iter()
            .map(|i| i.keys[0].as_str())
            .collect();
        assert_eq!(keys, vec!["ENC1", "ENC2", "ENC3"]);
    }
}

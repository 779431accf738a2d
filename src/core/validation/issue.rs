//! Validation issues and results

use crate::core::validation::rules::{RuleId, Severity};
use crate::domain::records::{EntityKind, StagedBatch};
use crate::domain::{ClinistarError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One data-quality defect found in the staged records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule_id: RuleId,
    pub severity: Severity,
    pub entity_kind: EntityKind,
    /// Offending natural key(s), most specific first
    pub keys: Vec<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} [{}]: {}",
            self.severity,
            self.rule_id,
            self.entity_kind,
            self.keys.join(", "),
            self.message
        )
    }
}

/// Complete report of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[must_use = "a validation result must be checked before building"]
pub struct ValidationResult {
    /// Issues ordered by rule evaluation order, then natural key
    pub issues: Vec<ValidationIssue>,

    /// True iff no issue is fatal
    pub passed: bool,
}

impl ValidationResult {
    /// Wraps an ordered issue list and derives `passed`
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let passed = !issues.iter().any(ValidationIssue::is_fatal);
        Self { issues, passed }
    }

    pub fn fatal_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_fatal())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| !i.is_fatal())
    }

    pub fn fatal_count(&self) -> usize {
        self.fatal_issues().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Run-log notes for a failed validation: the first `max` fatal issues
    pub fn failure_notes(&self, max: usize) -> String {
        let fatal: Vec<&ValidationIssue> = self.fatal_issues().collect();
        let mut notes = format!("validation failed: {} fatal issue(s)", fatal.len());
        for issue in fatal.iter().take(max) {
            notes.push_str("; ");
            notes.push_str(&format!(
                "{} {} [{}]: {}",
                issue.rule_id,
                issue.entity_kind,
                issue.keys.join(", "),
                issue.message
            ));
        }
        if fatal.len() > max {
            notes.push_str(&format!("; ... and {} more", fatal.len() - max));
        }
        notes
    }

    /// Human-readable report
    pub fn format_report(&self) -> String {
        let mut report = String::new();
        report.push_str("🔍 Validation Report\n");
        report.push_str(&format!(
            "  Result: {}\n",
            if self.passed { "✅ passed" } else { "❌ failed" }
        ));
        report.push_str(&format!("  Fatal issues: {}\n", self.fatal_count()));
        report.push_str(&format!("  Warnings: {}\n", self.warning_count()));

        if !self.issues.is_empty() {
            report.push_str("\nIssues:\n");
            for issue in &self.issues {
                report.push_str(&format!("  - {issue}\n"));
            }
        }

        report
    }
}

/// Staged records that passed validation
///
/// Only obtainable from a passing [`ValidationResult`], so the builder can
/// never run on records that failed validation.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedRecords<'a> {
    batch: &'a StagedBatch,
}

impl<'a> ValidatedRecords<'a> {
    /// Accepts the batch if its validation passed
    ///
    /// # Errors
    ///
    /// Returns `ClinistarError::Validation` if the result has fatal issues.
    pub fn accept(batch: &'a StagedBatch, result: &ValidationResult) -> Result<Self> {
        if !result.passed {
            return Err(ClinistarError::Validation(format!(
                "{} fatal issue(s) block the build",
                result.fatal_count()
            )));
        }
        Ok(Self { batch })
    }

    pub fn batch(&self) -> &'a StagedBatch {
        self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(rule_id: RuleId, severity: Severity, key: &str) -> ValidationIssue {
        ValidationIssue {
            rule_id,
            severity,
            entity_kind: EntityKind::Encounter,
            keys: vec![key.to_string()],
            message: "test".to_string(),
        }
    }

    #[test]
    fn test_passed_ignores_warnings() {
        let result = ValidationResult::from_issues(vec![issue(
            RuleId::DimensionConflict,
            Severity::Warning,
            "PRV0001",
        )]);
        assert!(result.passed);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_failure_notes_truncates() {
        let result = ValidationResult::from_issues(vec![
            issue(RuleId::DuplicateKey, Severity::Fatal, "ENC1"),
            issue(RuleId::TemporalConsistency, Severity::Fatal, "ENC2"),
            issue(RuleId::TemporalConsistency, Severity::Fatal, "ENC3"),
        ]);
        assert!(!result.passed);

        let notes = result.failure_notes(2);
        assert!(notes.starts_with("validation failed: 3 fatal issue(s)"));
        assert!(notes.contains("ENC1"));
        assert!(notes.contains("ENC2"));
        assert!(!notes.contains("ENC3"));
        assert!(notes.ends_with("... and 1 more"));
    }

    #[test]
    fn test_validated_records_requires_pass() {
        let batch = StagedBatch::default();
        let failed = ValidationResult::from_issues(vec![issue(
            RuleId::DuplicateKey,
            Severity::Fatal,
            "ENC1",
        )]);
        assert!(ValidatedRecords::accept(&batch, &failed).is_err());

        let passed = ValidationResult::from_issues(vec![]);
        assert!(ValidatedRecords::accept(&batch, &passed).is_ok());
    }
}

//! Verification report structures

use crate::domain::records::EntityKind;
use crate::domain::warehouse::WarehouseTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of reading the warehouse back after a commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// When the verification was performed
    pub verified_at: DateTime<Utc>,

    /// Fingerprint of the delta that was committed
    pub expected_fingerprint: String,

    /// Fingerprint of what the warehouse holds now
    pub actual_fingerprint: String,

    /// Rows read back per table
    pub row_counts: BTreeMap<WarehouseTable, usize>,

    /// Fact foreign keys that do not resolve to exactly one dimension row
    pub failures: Vec<VerificationFailure>,

    /// Duration of verification in milliseconds
    pub duration_ms: u64,
}

/// An unresolved fact foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub encounter_id: String,

    /// Dimension the key should resolve in
    pub entity_kind: EntityKind,

    pub key: String,

    /// Number of matching dimension rows (0 or more than 1)
    pub matches: usize,
}

impl VerificationReport {
    pub fn fingerprint_matches(&self) -> bool {
        self.expected_fingerprint == self.actual_fingerprint
    }

    pub fn is_success(&self) -> bool {
        self.fingerprint_matches() && self.failures.is_empty()
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("📊 Verification Report\n");
        summary.push_str(&format!("  Verified at: {}\n", self.verified_at));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        for (table, count) in &self.row_counts {
            summary.push_str(&format!("  {table}: {count} rows\n"));
        }
        summary.push_str(&format!(
            "  Fingerprint: {}\n",
            if self.fingerprint_matches() {
                "✅ matches committed delta"
            } else {
                "❌ differs from committed delta"
            }
        ));
        summary.push_str(&format!("  Unresolved foreign keys: {}\n", self.failures.len()));

        if !self.failures.is_empty() {
            summary.push_str("\n❌ Failures:\n");
            for (i, failure) in self.failures.iter().enumerate() {
                summary.push_str(&format!(
                    "  {}. Encounter {}: {} '{}' matched {} row(s)\n",
                    i + 1,
                    failure.encounter_id,
                    failure.entity_kind,
                    failure.key,
                    failure.matches
                ));
            }
        }

        summary
    }
}

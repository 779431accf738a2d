//! Build summary and reporting

use crate::config::StagingSourceMode;
use crate::core::validation::ValidationResult;
use crate::core::verification::checksum::short;
use crate::core::verification::report::VerificationReport;
use crate::domain::ids::RunId;
use crate::domain::warehouse::WarehouseTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// How a build attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Warehouse replaced and run finalized as success
    Committed,
    /// Validated and derived; nothing written
    DryRun,
    /// Fatal validation issues blocked the build
    ValidationFailed,
    /// The builder found an internal inconsistency
    BuildAborted,
    /// The commit transaction failed and was rolled back
    RolledBack,
    /// Committed, but the read-back did not match
    VerificationFailed,
    /// A shutdown signal stopped the build before commit
    Cancelled,
}

impl BuildOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildOutcome::Committed | BuildOutcome::DryRun => 0,
            BuildOutcome::ValidationFailed => 3,
            BuildOutcome::BuildAborted
            | BuildOutcome::RolledBack
            | BuildOutcome::VerificationFailed
            | BuildOutcome::Cancelled => 5,
        }
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildOutcome::Committed => "committed",
            BuildOutcome::DryRun => "dry run",
            BuildOutcome::ValidationFailed => "validation failed",
            BuildOutcome::BuildAborted => "build aborted",
            BuildOutcome::RolledBack => "rolled back",
            BuildOutcome::VerificationFailed => "verification failed",
            BuildOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Summary of one build attempt
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub outcome: BuildOutcome,

    /// Run log entry of the attempt (none for dry runs)
    pub run_id: Option<RunId>,

    pub source: StagingSourceMode,

    /// Staged records decoded from the source tables
    pub staged_records: usize,

    pub validation: ValidationResult,

    /// Rows derived per warehouse table
    pub rows: BTreeMap<WarehouseTable, usize>,

    /// SHA-256 fingerprint of the derived delta
    pub fingerprint: Option<String>,

    /// Triggering error for aborted or rolled back builds
    pub error: Option<String>,

    pub duration: Duration,

    /// Verification report (if verification was run)
    pub verification_report: Option<VerificationReport>,
}

impl BuildSummary {
    pub(crate) fn new(source: StagingSourceMode, run_id: Option<RunId>) -> Self {
        Self {
            outcome: BuildOutcome::DryRun,
            run_id,
            source,
            staged_records: 0,
            validation: ValidationResult::default(),
            rows: BTreeMap::new(),
            fingerprint: None,
            error: None,
            duration: Duration::ZERO,
            verification_report: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn is_successful(&self) -> bool {
        self.exit_code() == 0
    }

    pub fn total_rows(&self) -> usize {
        self.rows.values().sum()
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            outcome = %self.outcome,
            run_id = ?self.run_id.map(|r| r.value()),
            source = %self.source,
            staged_records = self.staged_records,
            fatal_issues = self.validation.fatal_count(),
            warnings = self.validation.warning_count(),
            rows = self.total_rows(),
            duration_ms = self.duration.as_millis() as u64,
            "Build completed"
        );

        if let Some(error) = &self.error {
            tracing::error!(outcome = %self.outcome, error = %error, "Build did not commit");
        }
    }

    /// Human-readable summary
    pub fn format_summary(&self) -> String {
        let icon = if self.is_successful() { "✅" } else { "❌" };
        let mut out = String::new();
        out.push_str(&format!("{icon} Build {}\n", self.outcome));
        if let Some(run_id) = self.run_id {
            out.push_str(&format!("  Run: #{run_id}\n"));
        }
        out.push_str(&format!("  Source: {}\n", self.source));
        out.push_str(&format!("  Staged records: {}\n", self.staged_records));
        out.push_str(&format!(
            "  Issues: {} fatal, {} warning(s)\n",
            self.validation.fatal_count(),
            self.validation.warning_count()
        ));
        for (table, count) in &self.rows {
            out.push_str(&format!("  {table}: {count} rows\n"));
        }
        if let Some(fp) = &self.fingerprint {
            out.push_str(&format!("  Fingerprint: {}\n", short(fp)));
        }
        out.push_str(&format!("  Duration: {:.2}s\n", self.duration.as_secs_f64()));
        if let Some(error) = &self.error {
            out.push_str(&format!("  Error: {error}\n"));
        }
        out
    }
}

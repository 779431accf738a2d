//! Run log entry model
//!
//! One `etl_run_log` row per attempt. Entries are created as `running` and
//! finalized exactly once; nothing rewrites a finalized entry.

use crate::domain::ids::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a run log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Attempt in progress (or the process died before finalizing)
    Running,
    /// Warehouse committed
    Success,
    /// Attempt ended without changing the warehouse
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    /// Whether this is a terminal status
    pub fn is_final(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("Unknown run status '{other}'")),
        }
    }
}

/// One row of the append-only audit table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub notes: Option<String>,
}

impl RunLogEntry {
    /// Wall-clock duration, once finalized
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }

    /// One-line summary for `status` output
    pub fn summary_line(&self) -> String {
        let icon = match self.status {
            RunStatus::Running => "⏳",
            RunStatus::Success => "✅",
            RunStatus::Failed => "❌",
        };
        let duration = self
            .duration()
            .map(|d| format!(" ({:.1}s)", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_default();
        format!(
            "{icon} #{} {} {}{duration}: {}",
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.status,
            self.notes.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trip() {
        for status in [RunStatus::Running, RunStatus::Success, RunStatus::Failed] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("done".parse::<RunStatus>().is_err());
        assert!(!RunStatus::Running.is_final());
        assert!(RunStatus::Failed.is_final());
    }

    #[test]
    fn test_summary_line() {
        let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let entry = RunLogEntry {
            run_id: RunId::new(7),
            started_at: started,
            finished_at: Some(started + chrono::Duration::milliseconds(2500)),
            status: RunStatus::Failed,
            notes: Some("validation failed: 1 fatal issue(s)".to_string()),
        };
        assert_eq!(
            entry.summary_line(),
            "❌ #7 2024-03-01 12:00:00 failed (2.5s): validation failed: 1 fatal issue(s)"
        );
    }
}

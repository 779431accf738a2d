//! Run logger
//!
//! Thin wrapper over a [`RunLogStore`] that owns the run-log lifecycle of a
//! build: `begin_run` before anything else, then exactly one finalization.

use crate::adapters::database::traits::RunLogStore;
use crate::core::runlog::entry::{RunLogEntry, RunStatus};
use crate::domain::ids::RunId;
use crate::domain::{ClinistarError, Result};
use std::sync::Arc;

/// Run log lifecycle over a store
pub struct RunLogger {
    store: Arc<dyn RunLogStore + Send + Sync>,
}

impl RunLogger {
    pub fn new(store: Arc<dyn RunLogStore + Send + Sync>) -> Self {
        Self { store }
    }

    /// Records the start of an attempt and returns its id
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    pub async fn begin_run(&self, notes: &str) -> Result<RunId> {
        let entry = self.store.insert_run(notes).await?;
        tracing::info!(run_id = %entry.run_id, notes = notes, "Run started");
        Ok(entry.run_id)
    }

    /// Finalizes an attempt outside the warehouse transaction
    ///
    /// Success is normally finalized by the transaction coordinator inside
    /// the commit; this path is for failures and for runs with nothing to
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns `ClinistarError::State` if `status` is `running` or the entry
    /// was already finalized.
    pub async fn end_run(&self, run_id: RunId, status: RunStatus, notes: &str) -> Result<()> {
        if !status.is_final() {
            return Err(ClinistarError::State(format!(
                "Run {run_id} cannot be finalized as '{status}'"
            )));
        }
        self.store.finalize_run(run_id, status, notes).await?;

        match status {
            RunStatus::Failed => {
                tracing::warn!(run_id = %run_id, notes = notes, "Run finalized as failed")
            }
            _ => tracing::info!(run_id = %run_id, status = %status, "Run finalized"),
        }
        Ok(())
    }

    /// Most recent entries, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>> {
        self.store.list_runs(limit).await
    }
}

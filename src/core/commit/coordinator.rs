//! Transaction coordinator
//!
//! The only writer of warehouse tables. A commit replaces the whole
//! warehouse in one transaction: lock, truncate facts then dimensions, load
//! dimensions then facts, finalize the run log entry, commit. Any failure
//! rolls back and the previous warehouse content stays as it was.

use crate::adapters::database::traits::{WarehouseStore, WarehouseTransaction};
use crate::core::runlog::entry::RunStatus;
use crate::domain::errors::TransactionFailure;
use crate::domain::ids::RunId;
use crate::domain::warehouse::{WarehouseDelta, WarehouseTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a commit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    Committed,
    RolledBack,
}

/// Result of [`TransactionCoordinator::commit`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a rolled back commit must be reported"]
pub struct CommitResult {
    pub status: CommitStatus,
    pub run_id: RunId,

    /// Rows written per table (empty when rolled back)
    pub rows: BTreeMap<WarehouseTable, usize>,

    /// The failure that caused a rollback
    pub error: Option<TransactionFailure>,
}

impl CommitResult {
    pub fn is_committed(&self) -> bool {
        self.status == CommitStatus::Committed
    }

    pub fn total_rows(&self) -> usize {
        self.rows.values().sum()
    }
}

/// Applies a [`WarehouseDelta`] atomically
pub struct TransactionCoordinator {
    store: Arc<dyn WarehouseStore + Send + Sync>,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn WarehouseStore + Send + Sync>) -> Self {
        Self { store }
    }

    /// Replaces the warehouse content with `delta` and finalizes `run_id`
    /// as `success` in the same transaction
    ///
    /// Never returns a partially applied warehouse: the result is either
    /// `Committed` with every row written, or `RolledBack` with the
    /// triggering failure. A rolled back run is still `running` in the run
    /// log; the caller finalizes it as failed.
    pub async fn commit(&self, delta: &WarehouseDelta, run_id: RunId, notes: &str) -> CommitResult {
        let started = Instant::now();
        tracing::info!(run_id = %run_id, rows = delta.total_rows(), "Opening warehouse transaction");

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => return Self::rolled_back(run_id, e),
        };

        if let Err(e) = Self::apply(tx.as_mut(), delta, run_id, notes).await {
            tracing::error!(run_id = %run_id, error = %e, "Warehouse load failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                // The connection is discarded; the server rolls back on its own
                tracing::warn!(run_id = %run_id, error = %rollback_err, "Explicit rollback failed");
            }
            return Self::rolled_back(run_id, e);
        }

        if let Err(e) = tx.commit().await {
            tracing::error!(run_id = %run_id, error = %e, "Warehouse commit failed");
            return Self::rolled_back(run_id, e);
        }

        let rows: BTreeMap<WarehouseTable, usize> = WarehouseTable::LOAD_ORDER
            .iter()
            .map(|t| (*t, delta.row_count(*t)))
            .collect();

        tracing::info!(
            run_id = %run_id,
            rows = delta.total_rows(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Warehouse committed"
        );

        CommitResult {
            status: CommitStatus::Committed,
            run_id,
            rows,
            error: None,
        }
    }

    async fn apply(
        tx: &mut dyn WarehouseTransaction,
        delta: &WarehouseDelta,
        run_id: RunId,
        notes: &str,
    ) -> Result<(), TransactionFailure> {
        tx.lock_tables().await?;

        for table in WarehouseTable::TRUNCATE_ORDER {
            tx.truncate(table).await?;
        }

        for table in WarehouseTable::LOAD_ORDER {
            match table {
                WarehouseTable::DimDepartment => tx.insert_departments(&delta.departments).await?,
                WarehouseTable::DimProvider => tx.insert_providers(&delta.providers).await?,
                WarehouseTable::DimPatient => tx.insert_patients(&delta.patients).await?,
                WarehouseTable::DimTime => tx.insert_time_days(&delta.time_days).await?,
                WarehouseTable::FactEncounter => tx.insert_facts(&delta.facts).await?,
            }
            tracing::debug!(table = %table, rows = delta.row_count(table), "Loaded warehouse table");
        }

        tx.finalize_run(run_id, RunStatus::Success, notes).await
    }

    fn rolled_back(run_id: RunId, error: TransactionFailure) -> CommitResult {
        CommitResult {
            status: CommitStatus::RolledBack,
            run_id,
            rows: BTreeMap::new(),
            error: Some(error),
        }
    }
}

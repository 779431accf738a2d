//! In-memory store
//!
//! Implements every store trait over process memory. Warehouse writes go
//! to a working copy that replaces the committed content on commit, and
//! inserts enforce the warehouse primary and foreign keys, so the
//! coordinator's atomicity can be exercised without a database.

use crate::adapters::database::traits::{
    RunLogStore, StagingSource, WarehouseStore, WarehouseTransaction,
};
use crate::adapters::memory::transaction::MemoryTransaction;
use crate::core::runlog::entry::{RunLogEntry, RunStatus};
use crate::core::staging::tables::{ColumnBag, StagingRows, StagingTable};
use crate::domain::errors::TransactionFailure;
use crate::domain::ids::{EncounterId, RunId};
use crate::domain::warehouse::WarehouseDelta;
use crate::domain::{ClinistarError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Failures a store handle injects into its warehouse transactions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Reject the insert of this fact row
    pub fail_fact_insert: Option<EncounterId>,
    pub fail_begin: bool,
    pub fail_commit: bool,
}

/// In-memory store for local development and tests
///
/// Clones share state. Fault injection is per handle, so a faulty clone
/// can run against the same data as a healthy one.
#[derive(Clone, Default)]
pub struct MemoryStore {
    staging: Arc<Mutex<StagingRows>>,
    runs: Arc<Mutex<Vec<RunLogEntry>>>,
    warehouse: Arc<Mutex<WarehouseDelta>>,
    table_lock: Arc<Mutex<()>>,
    faults: FaultPlan,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose staging tables hold `rows`
    pub fn with_staging(rows: StagingRows) -> Self {
        Self {
            staging: Arc::new(Mutex::new(rows)),
            ..Self::default()
        }
    }

    /// Reject the insert of the fact row for `encounter_id`
    pub fn with_fact_insert_failure(mut self, encounter_id: EncounterId) -> Self {
        self.faults.fail_fact_insert = Some(encounter_id);
        self
    }

    pub fn with_begin_failure(mut self) -> Self {
        self.faults.fail_begin = true;
        self
    }

    pub fn with_commit_failure(mut self) -> Self {
        self.faults.fail_commit = true;
        self
    }

    /// Snapshot of the committed warehouse
    pub async fn committed(&self) -> WarehouseDelta {
        self.warehouse.lock().await.clone()
    }

    /// Snapshot of the run log, oldest first
    pub async fn runs(&self) -> Vec<RunLogEntry> {
        self.runs.lock().await.clone()
    }

    /// Snapshot of the staging tables
    pub async fn staging(&self) -> StagingRows {
        self.staging.lock().await.clone()
    }

    /// Hold the warehouse table lock, as a concurrent build would
    pub async fn hold_table_lock(&self) -> tokio::sync::OwnedMutexGuard<()> {
        self.table_lock.clone().lock_owned().await
    }
}

/// Finalizes a running entry; shared with the transaction's commit path
pub(crate) fn finalize_entry(
    runs: &mut [RunLogEntry],
    run_id: RunId,
    status: RunStatus,
    notes: &str,
) -> std::result::Result<(), String> {
    let entry = runs
        .iter_mut()
        .find(|e| e.run_id == run_id)
        .ok_or_else(|| format!("Run {run_id} does not exist"))?;

    if entry.status.is_final() {
        return Err(format!("Run {run_id} was already finalized as '{}'", entry.status));
    }

    entry.status = status;
    entry.finished_at = Some(Utc::now());
    entry.notes = Some(notes.to_string());
    Ok(())
}

#[async_trait]
impl StagingSource for MemoryStore {
    async fn read_table(&self, table: StagingTable) -> Result<Vec<ColumnBag>> {
        Ok(self.staging.lock().await.rows(table).to_vec())
    }

    async fn replace_tables(&self, rows: &StagingRows) -> Result<()> {
        let mut staging = self.staging.lock().await;
        for (table, table_rows) in &rows.tables {
            staging.tables.insert(*table, table_rows.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl RunLogStore for MemoryStore {
    async fn insert_run(&self, notes: &str) -> Result<RunLogEntry> {
        let mut runs = self.runs.lock().await;
        let next_id = runs.last().map(|e| e.run_id.value() + 1).unwrap_or(1);

        let entry = RunLogEntry {
            run_id: RunId::new(next_id),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            notes: Some(notes.to_string()),
        };
        runs.push(entry.clone());
        Ok(entry)
    }

    async fn finalize_run(&self, run_id: RunId, status: RunStatus, notes: &str) -> Result<()> {
        let mut runs = self.runs.lock().await;
        finalize_entry(&mut runs, run_id, status, notes).map_err(ClinistarError::State)
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>> {
        let runs = self.runs.lock().await;
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl WarehouseStore for MemoryStore {
    async fn begin(&self) -> std::result::Result<Box<dyn WarehouseTransaction>, TransactionFailure> {
        if self.faults.fail_begin {
            return Err(TransactionFailure::Begin("begin failure injected".to_string()));
        }

        let working = self.warehouse.lock().await.clone();
        Ok(Box::new(MemoryTransaction::new(
            working,
            self.warehouse.clone(),
            self.runs.clone(),
            self.table_lock.clone(),
            self.faults.clone(),
        )))
    }

    async fn read_warehouse(&self) -> Result<WarehouseDelta> {
        let mut delta = self.warehouse.lock().await.clone();
        delta.normalize();
        Ok(delta)
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }
}

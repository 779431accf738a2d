//! Store abstraction traits
//!
//! This module defines the traits a store must implement to back Clinistar.
//! PostgreSQL is the production store; the in-memory store implements the
//! same traits for tests.
//!
//! Every component receives its store handle explicitly; there is no
//! process-wide connection.

use crate::core::runlog::entry::{RunLogEntry, RunStatus};
use crate::core::staging::tables::{ColumnBag, StagingRows, StagingTable};
use crate::domain::errors::TransactionFailure;
use crate::domain::ids::RunId;
use crate::domain::warehouse::{
    DepartmentDim, EncounterFact, PatientDim, ProviderDim, TimeDay, WarehouseDelta,
    WarehouseTable,
};
use crate::domain::Result;
use async_trait::async_trait;

/// Read and replace access to staging tables
#[async_trait]
pub trait StagingSource: Send + Sync {
    /// Read every row of a staging table as text columns, in table order
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the query fails.
    async fn read_table(&self, table: StagingTable) -> Result<Vec<ColumnBag>>;

    /// Replace the content of the given staging tables in one transaction
    ///
    /// Tables present in `rows` are emptied and reloaded; other tables are
    /// left alone. Either every table is replaced or none is.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; nothing is changed in that case.
    async fn replace_tables(&self, rows: &StagingRows) -> Result<()>;
}

/// The append-only `etl_run_log` audit table
#[async_trait]
pub trait RunLogStore: Send + Sync {
    /// Insert a `running` entry and return it with its assigned id
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    async fn insert_run(&self, notes: &str) -> Result<RunLogEntry>;

    /// Finalize a `running` entry outside any warehouse transaction
    ///
    /// # Errors
    ///
    /// Returns `ClinistarError::State` if the entry does not exist or was
    /// already finalized.
    async fn finalize_run(&self, run_id: RunId, status: RunStatus, notes: &str) -> Result<()>;

    /// Most recent entries, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>>;
}

/// The star-schema warehouse
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    /// Open the single transaction a build commits through
    ///
    /// # Errors
    ///
    /// Returns `TransactionFailure::Begin` if no transaction can be opened.
    async fn begin(&self) -> std::result::Result<Box<dyn WarehouseTransaction>, TransactionFailure>;

    /// Read the committed warehouse content back, normalized
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn read_warehouse(&self) -> Result<WarehouseDelta>;

    /// Create staging, warehouse and run log tables if absent
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    async fn ensure_schema(&self) -> Result<()>;
}

/// An open warehouse transaction
///
/// Nothing written through a transaction is visible until [`commit`]
/// succeeds. A transaction dropped without `commit` or `rollback` is rolled
/// back.
///
/// [`commit`]: WarehouseTransaction::commit
#[async_trait]
pub trait WarehouseTransaction: Send {
    /// Take exclusive locks on every warehouse table
    async fn lock_tables(&mut self) -> std::result::Result<(), TransactionFailure>;

    async fn truncate(&mut self, table: WarehouseTable)
        -> std::result::Result<(), TransactionFailure>;

    async fn insert_departments(
        &mut self,
        rows: &[DepartmentDim],
    ) -> std::result::Result<(), TransactionFailure>;

    async fn insert_providers(
        &mut self,
        rows: &[ProviderDim],
    ) -> std::result::Result<(), TransactionFailure>;

    async fn insert_patients(
        &mut self,
        rows: &[PatientDim],
    ) -> std::result::Result<(), TransactionFailure>;

    async fn insert_time_days(
        &mut self,
        rows: &[TimeDay],
    ) -> std::result::Result<(), TransactionFailure>;

    async fn insert_facts(
        &mut self,
        rows: &[EncounterFact],
    ) -> std::result::Result<(), TransactionFailure>;

    /// Finalize a `running` run log entry as part of this transaction
    async fn finalize_run(
        &mut self,
        run_id: RunId,
        status: RunStatus,
        notes: &str,
    ) -> std::result::Result<(), TransactionFailure>;

    async fn commit(self: Box<Self>) -> std::result::Result<(), TransactionFailure>;

    async fn rollback(self: Box<Self>) -> std::result::Result<(), TransactionFailure>;
}

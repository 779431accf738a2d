//! PostgreSQL adapter implementing the store traits
//!
//! One adapter backs staging reads, the run log and the warehouse, all on
//! the same connection pool.

use crate::adapters::database::traits::{
    RunLogStore, StagingSource, WarehouseStore, WarehouseTransaction,
};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{
    column_bag_from_row, department_from_row, fact_from_row, patient_from_row,
    provider_from_row, run_log_entry_from_row, select_warehouse_sql, time_day_from_row,
    RUN_LOG_COLUMNS,
};
use crate::adapters::postgresql::transaction::PostgreSQLTransaction;
use crate::core::runlog::entry::{RunLogEntry, RunStatus};
use crate::core::staging::tables::{ColumnBag, StagingRows, StagingTable};
use crate::domain::errors::TransactionFailure;
use crate::domain::ids::RunId;
use crate::domain::warehouse::{WarehouseDelta, WarehouseTable};
use crate::domain::{ClinistarError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

/// PostgreSQL implementation of the store traits
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter over a shared client
    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    async fn read_rows<T>(&self, table: WarehouseTable, map: fn(&Row) -> Result<T>) -> Result<Vec<T>> {
        self.client
            .query(select_warehouse_sql(table), &[])
            .await?
            .iter()
            .map(map)
            .collect()
    }
}

#[async_trait]
impl StagingSource for PostgreSQLAdapter {
    async fn read_table(&self, table: StagingTable) -> Result<Vec<ColumnBag>> {
        let rows = self
            .client
            .query(&table.select_text_sql(), &[])
            .await
            .map_err(|e| ClinistarError::Staging(format!("Failed to read {table}: {e}")))?;

        rows.iter().map(|row| column_bag_from_row(table, row)).collect()
    }

    async fn replace_tables(&self, rows: &StagingRows) -> Result<()> {
        let mut conn = self.client.get_connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| ClinistarError::Database(format!("Failed to begin transaction: {e}")))?;

        for (table, table_rows) in &rows.tables {
            tx.batch_execute(&format!("TRUNCATE TABLE {table}"))
                .await
                .map_err(|e| ClinistarError::Database(format!("Failed to truncate {table}: {e}")))?;

            let stmt = tx
                .prepare(&table.insert_sql())
                .await
                .map_err(|e| ClinistarError::Database(format!("Failed to prepare insert into {table}: {e}")))?;

            for row in table_rows {
                let values: Vec<Option<String>> = table
                    .columns()
                    .iter()
                    .map(|c| row.get(*c).cloned().flatten())
                    .collect();
                let params: Vec<&(dyn ToSql + Sync)> =
                    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

                tx.execute(&stmt, &params)
                    .await
                    .map_err(|e| ClinistarError::Database(format!("Failed to insert into {table}: {e}")))?;
            }

            tracing::debug!(table = %table, rows = table_rows.len(), "Staging table replaced");
        }

        // Dropping the transaction on any error above rolls it back
        tx.commit()
            .await
            .map_err(|e| ClinistarError::Database(format!("Failed to commit staging load: {e}")))
    }
}

#[async_trait]
impl RunLogStore for PostgreSQLAdapter {
    async fn insert_run(&self, notes: &str) -> Result<RunLogEntry> {
        let rows = self
            .client
            .query(
                &format!(
                    "INSERT INTO etl_run_log (status, notes) VALUES ('running', $1) \
                     RETURNING {RUN_LOG_COLUMNS}"
                ),
                &[&notes],
            )
            .await?;

        let row = rows
            .first()
            .ok_or_else(|| ClinistarError::State("Run log insert returned no row".to_string()))?;
        run_log_entry_from_row(row)
    }

    async fn finalize_run(&self, run_id: RunId, status: RunStatus, notes: &str) -> Result<()> {
        let updated = self
            .client
            .execute(
                "UPDATE etl_run_log SET finished_at = now(), status = $2, notes = $3 \
                 WHERE run_id = $1 AND status = 'running'",
                &[&run_id.value(), &status.as_str(), &notes],
            )
            .await?;

        if updated == 0 {
            return Err(ClinistarError::State(format!(
                "Run {run_id} does not exist or was already finalized"
            )));
        }
        Ok(())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .client
            .query(
                &format!("SELECT {RUN_LOG_COLUMNS} FROM etl_run_log ORDER BY run_id DESC LIMIT $1"),
                &[&limit],
            )
            .await?;

        rows.iter().map(run_log_entry_from_row).collect()
    }
}

#[async_trait]
impl WarehouseStore for PostgreSQLAdapter {
    async fn begin(&self) -> std::result::Result<Box<dyn WarehouseTransaction>, TransactionFailure> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(|e| TransactionFailure::Begin(e.to_string()))?;

        let tx = PostgreSQLTransaction::begin(
            conn,
            self.client.statement_timeout_ms(),
            self.client.lock_timeout_ms(),
        )
        .await?;
        Ok(Box::new(tx))
    }

    async fn read_warehouse(&self) -> Result<WarehouseDelta> {
        let mut delta = WarehouseDelta {
            departments: self.read_rows(WarehouseTable::DimDepartment, department_from_row).await?,
            providers: self.read_rows(WarehouseTable::DimProvider, provider_from_row).await?,
            patients: self.read_rows(WarehouseTable::DimPatient, patient_from_row).await?,
            time_days: self.read_rows(WarehouseTable::DimTime, time_day_from_row).await?,
            facts: self.read_rows(WarehouseTable::FactEncounter, fact_from_row).await?,
        };
        delta.normalize();
        Ok(delta)
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema().await
    }
}

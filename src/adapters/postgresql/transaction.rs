//! Warehouse transaction on a dedicated pooled connection
//!
//! The connection is owned for the life of the transaction. If the
//! transaction is dropped while still open, or COMMIT/ROLLBACK fails, the
//! connection is detached from the pool and closed, and the server rolls
//! the transaction back.

use crate::adapters::database::traits::WarehouseTransaction;
use crate::core::runlog::entry::RunStatus;
use crate::domain::errors::TransactionFailure;
use crate::domain::ids::RunId;
use crate::domain::warehouse::{
    DepartmentDim, EncounterFact, PatientDim, ProviderDim, TimeDay, WarehouseTable,
};
use async_trait::async_trait;
use deadpool_postgres::Object;
use tokio_postgres::Statement;

const INSERT_DEPARTMENT: &str =
    "INSERT INTO dim_department (department_id, department_name) VALUES ($1, $2)";
const INSERT_PROVIDER: &str =
    "INSERT INTO dim_provider (provider_id, provider_name, department_id) VALUES ($1, $2, $3)";
const INSERT_PATIENT: &str =
    "INSERT INTO dim_patient (patient_id, birth_year, sex) VALUES ($1, $2, $3)";
const INSERT_TIME_DAY: &str =
    "INSERT INTO dim_time (date_key, year, month, day, dow) VALUES ($1, $2, $3, $4, $5)";
const INSERT_FACT: &str = "INSERT INTO fact_encounter (encounter_id, patient_id, provider_id, \
     department_id, admit_date, discharge_date, encounter_type, length_of_stay_days, total_charges) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, ($9::BIGINT)::NUMERIC / 100)";
const FINALIZE_RUN: &str = "UPDATE etl_run_log SET finished_at = now(), status = $2, notes = $3 \
     WHERE run_id = $1 AND status = 'running'";

fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({detail})", db.message()),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

/// An open `BEGIN ... COMMIT` block on one connection
pub struct PostgreSQLTransaction {
    conn: Option<Object>,
    finished: bool,
}

impl PostgreSQLTransaction {
    /// Opens the transaction and applies the session limits to it
    ///
    /// # Errors
    ///
    /// Returns `TransactionFailure::Begin` if the server rejects `BEGIN` or
    /// the timeout settings.
    pub async fn begin(
        conn: Object,
        statement_timeout_ms: u64,
        lock_timeout_ms: u64,
    ) -> Result<Self, TransactionFailure> {
        let tx = Self {
            conn: Some(conn),
            finished: false,
        };

        tx.conn()?
            .batch_execute(&format!(
                "BEGIN; SET LOCAL statement_timeout = {statement_timeout_ms}; \
                 SET LOCAL lock_timeout = {lock_timeout_ms}"
            ))
            .await
            .map_err(|e| TransactionFailure::Begin(describe(&e)))?;

        tracing::debug!(statement_timeout_ms, lock_timeout_ms, "Warehouse transaction opened");
        Ok(tx)
    }

    fn conn(&self) -> Result<&Object, TransactionFailure> {
        self.conn
            .as_ref()
            .ok_or_else(|| TransactionFailure::Begin("transaction connection released".to_string()))
    }

    async fn prepare(&self, table: WarehouseTable, sql: &str) -> Result<Statement, TransactionFailure> {
        self.conn()?
            .prepare_cached(sql)
            .await
            .map_err(|e| TransactionFailure::Insert {
                table,
                key: String::new(),
                message: describe(&e),
            })
    }
}

fn insert_failure(table: WarehouseTable, key: &str, e: &tokio_postgres::Error) -> TransactionFailure {
    TransactionFailure::Insert {
        table,
        key: key.to_string(),
        message: describe(e),
    }
}

#[async_trait]
impl WarehouseTransaction for PostgreSQLTransaction {
    async fn lock_tables(&mut self) -> Result<(), TransactionFailure> {
        let tables: Vec<&str> = WarehouseTable::TRUNCATE_ORDER
            .iter()
            .map(WarehouseTable::table_name)
            .collect();
        self.conn()?
            .batch_execute(&format!(
                "LOCK TABLE {} IN ACCESS EXCLUSIVE MODE",
                tables.join(", ")
            ))
            .await
            .map_err(|e| TransactionFailure::Lock(describe(&e)))
    }

    async fn truncate(&mut self, table: WarehouseTable) -> Result<(), TransactionFailure> {
        let sql = match table {
            WarehouseTable::FactEncounter => format!("TRUNCATE TABLE {table}"),
            _ => format!("TRUNCATE TABLE {table} CASCADE"),
        };
        self.conn()?
            .batch_execute(&sql)
            .await
            .map_err(|e| TransactionFailure::Truncate {
                table,
                message: describe(&e),
            })
    }

    async fn insert_departments(&mut self, rows: &[DepartmentDim]) -> Result<(), TransactionFailure> {
        let table = WarehouseTable::DimDepartment;
        let stmt = self.prepare(table, INSERT_DEPARTMENT).await?;
        let conn = self.conn()?;
        for row in rows {
            conn.execute(&stmt, &[&row.department_id.as_str(), &row.department_name])
                .await
                .map_err(|e| insert_failure(table, row.department_id.as_str(), &e))?;
        }
        Ok(())
    }

    async fn insert_providers(&mut self, rows: &[ProviderDim]) -> Result<(), TransactionFailure> {
        let table = WarehouseTable::DimProvider;
        let stmt = self.prepare(table, INSERT_PROVIDER).await?;
        let conn = self.conn()?;
        for row in rows {
            conn.execute(
                &stmt,
                &[
                    &row.provider_id.as_str(),
                    &row.provider_name,
                    &row.department_id.as_str(),
                ],
            )
            .await
            .map_err(|e| insert_failure(table, row.provider_id.as_str(), &e))?;
        }
        Ok(())
    }

    async fn insert_patients(&mut self, rows: &[PatientDim]) -> Result<(), TransactionFailure> {
        let table = WarehouseTable::DimPatient;
        let stmt = self.prepare(table, INSERT_PATIENT).await?;
        let conn = self.conn()?;
        for row in rows {
            conn.execute(&stmt, &[&row.patient_id.as_str(), &row.birth_year, &row.sex])
                .await
                .map_err(|e| insert_failure(table, row.patient_id.as_str(), &e))?;
        }
        Ok(())
    }

    async fn insert_time_days(&mut self, rows: &[TimeDay]) -> Result<(), TransactionFailure> {
        let table = WarehouseTable::DimTime;
        let stmt = self.prepare(table, INSERT_TIME_DAY).await?;
        let conn = self.conn()?;
        for row in rows {
            let (month, day, dow) = (row.month as i32, row.day as i32, row.dow as i32);
            conn.execute(&stmt, &[&row.date_key, &row.year, &month, &day, &dow])
                .await
                .map_err(|e| insert_failure(table, &row.date_key.to_string(), &e))?;
        }
        Ok(())
    }

    async fn insert_facts(&mut self, rows: &[EncounterFact]) -> Result<(), TransactionFailure> {
        let table = WarehouseTable::FactEncounter;
        let stmt = self.prepare(table, INSERT_FACT).await?;
        let conn = self.conn()?;
        for row in rows {
            let cents = row.total_charges.cents();
            conn.execute(
                &stmt,
                &[
                    &row.encounter_id.as_str(),
                    &row.patient_id.as_str(),
                    &row.provider_id.as_str(),
                    &row.department_id.as_str(),
                    &row.admit_date,
                    &row.discharge_date,
                    &row.encounter_type,
                    &row.length_of_stay_days,
                    &cents,
                ],
            )
            .await
            .map_err(|e| insert_failure(table, row.encounter_id.as_str(), &e))?;
        }
        Ok(())
    }

    async fn finalize_run(
        &mut self,
        run_id: RunId,
        status: RunStatus,
        notes: &str,
    ) -> Result<(), TransactionFailure> {
        let updated = self
            .conn()?
            .execute(FINALIZE_RUN, &[&run_id.value(), &status.as_str(), &notes])
            .await
            .map_err(|e| TransactionFailure::Finalize(describe(&e)))?;

        if updated == 0 {
            return Err(TransactionFailure::Finalize(format!(
                "run {run_id} is not a running entry"
            )));
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), TransactionFailure> {
        self.conn()?
            .batch_execute("COMMIT")
            .await
            .map_err(|e| TransactionFailure::Commit(describe(&e)))?;
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), TransactionFailure> {
        self.conn()?
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| TransactionFailure::Rollback(describe(&e)))?;
        self.finished = true;
        tracing::info!("Warehouse transaction rolled back");
        Ok(())
    }
}

impl Drop for PostgreSQLTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Warehouse transaction left open, discarding its connection");
            drop(Object::take(conn));
        }
    }
}

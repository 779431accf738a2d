//! In-memory warehouse transaction

use crate::adapters::database::traits::WarehouseTransaction;
use crate::adapters::memory::store::{finalize_entry, FaultPlan};
use crate::core::runlog::entry::{RunLogEntry, RunStatus};
use crate::domain::errors::TransactionFailure;
use crate::domain::ids::RunId;
use crate::domain::warehouse::{
    DepartmentDim, EncounterFact, PatientDim, ProviderDim, TimeDay, WarehouseDelta,
    WarehouseTable,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Writes to a working copy; nothing is visible until `commit`
pub struct MemoryTransaction {
    working: WarehouseDelta,
    committed: Arc<Mutex<WarehouseDelta>>,
    runs: Arc<Mutex<Vec<RunLogEntry>>>,
    table_lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    pending_finalize: Option<(RunId, RunStatus, String)>,
    faults: FaultPlan,
}

impl MemoryTransaction {
    pub(crate) fn new(
        working: WarehouseDelta,
        committed: Arc<Mutex<WarehouseDelta>>,
        runs: Arc<Mutex<Vec<RunLogEntry>>>,
        table_lock: Arc<Mutex<()>>,
        faults: FaultPlan,
    ) -> Self {
        Self {
            working,
            committed,
            runs,
            table_lock,
            guard: None,
            pending_finalize: None,
            faults,
        }
    }

    fn require_lock(&self) -> Result<(), TransactionFailure> {
        if self.guard.is_none() {
            return Err(TransactionFailure::Lock(
                "warehouse tables are not locked by this transaction".to_string(),
            ));
        }
        Ok(())
    }
}

fn violation(table: WarehouseTable, key: &str, message: String) -> TransactionFailure {
    TransactionFailure::Insert {
        table,
        key: key.to_string(),
        message,
    }
}

fn keys<'a, T, K: Eq + Hash>(rows: &'a [T], key: impl Fn(&'a T) -> K) -> HashSet<K> {
    rows.iter().map(key).collect()
}

/// Rejects a foreign key that does not resolve
fn require_ref<K: Eq + Hash + ToString>(
    table: WarehouseTable,
    row_key: &str,
    refs: &HashSet<K>,
    value: &K,
    target: WarehouseTable,
) -> Result<(), TransactionFailure> {
    if refs.contains(value) {
        return Ok(());
    }
    Err(violation(
        table,
        row_key,
        format!(
            "foreign key violation: '{}' is not present in {target}",
            value.to_string()
        ),
    ))
}

/// Appends `rows` to `target`, rejecting a duplicate primary key
fn insert_unique<T: Clone, K: Eq + Hash + ToString>(
    table: WarehouseTable,
    target: &mut Vec<T>,
    rows: &[T],
    key: impl Fn(&T) -> K,
    mut check: impl FnMut(&T) -> Result<(), TransactionFailure>,
) -> Result<(), TransactionFailure> {
    let mut seen: HashSet<K> = target.iter().map(&key).collect();
    for row in rows {
        let k = key(row);
        check(row)?;
        if seen.contains(&k) {
            let text = k.to_string();
            return Err(violation(
                table,
                &text,
                format!("duplicate key value '{text}' violates primary key of {table}"),
            ));
        }
        seen.insert(k);
        target.push(row.clone());
    }
    Ok(())
}

#[async_trait]
impl WarehouseTransaction for MemoryTransaction {
    async fn lock_tables(&mut self) -> Result<(), TransactionFailure> {
        let guard = self.table_lock.clone().try_lock_owned().map_err(|_| {
            TransactionFailure::Lock("could not obtain lock on warehouse tables".to_string())
        })?;
        self.guard = Some(guard);
        Ok(())
    }

    async fn truncate(&mut self, table: WarehouseTable) -> Result<(), TransactionFailure> {
        self.require_lock()?;
        match table {
            WarehouseTable::DimDepartment => self.working.departments.clear(),
            WarehouseTable::DimProvider => self.working.providers.clear(),
            WarehouseTable::DimPatient => self.working.patients.clear(),
            WarehouseTable::DimTime => self.working.time_days.clear(),
            WarehouseTable::FactEncounter => self.working.facts.clear(),
        }
        Ok(())
    }

    async fn insert_departments(&mut self, rows: &[DepartmentDim]) -> Result<(), TransactionFailure> {
        self.require_lock()?;
        insert_unique(
            WarehouseTable::DimDepartment,
            &mut self.working.departments,
            rows,
            |r| r.department_id.clone(),
            |_| Ok(()),
        )
    }

    async fn insert_providers(&mut self, rows: &[ProviderDim]) -> Result<(), TransactionFailure> {
        self.require_lock()?;
        let table = WarehouseTable::DimProvider;
        let departments = keys(&self.working.departments, |d| d.department_id.clone());
        insert_unique(
            table,
            &mut self.working.providers,
            rows,
            |r| r.provider_id.clone(),
            |r| {
                require_ref(
                    table,
                    r.provider_id.as_str(),
                    &departments,
                    &r.department_id,
                    WarehouseTable::DimDepartment,
                )
            },
        )
    }

    async fn insert_patients(&mut self, rows: &[PatientDim]) -> Result<(), TransactionFailure> {
        self.require_lock()?;
        insert_unique(
            WarehouseTable::DimPatient,
            &mut self.working.patients,
            rows,
            |r| r.patient_id.clone(),
            |_| Ok(()),
        )
    }

    async fn insert_time_days(&mut self, rows: &[TimeDay]) -> Result<(), TransactionFailure> {
        self.require_lock()?;
        insert_unique(
            WarehouseTable::DimTime,
            &mut self.working.time_days,
            rows,
            |r| r.date_key,
            |_| Ok(()),
        )
    }

    async fn insert_facts(&mut self, rows: &[EncounterFact]) -> Result<(), TransactionFailure> {
        self.require_lock()?;
        let table = WarehouseTable::FactEncounter;
        let patients = keys(&self.working.patients, |p| p.patient_id.clone());
        let providers = keys(&self.working.providers, |p| p.provider_id.clone());
        let departments = keys(&self.working.departments, |d| d.department_id.clone());
        let days = keys(&self.working.time_days, |d| d.date_key);
        let fail_on = self.faults.fail_fact_insert.clone();

        insert_unique(
            table,
            &mut self.working.facts,
            rows,
            |r| r.encounter_id.clone(),
            |r| {
                let key = r.encounter_id.as_str();
                if fail_on.as_ref() == Some(&r.encounter_id) {
                    return Err(violation(table, key, "insert failure injected".to_string()));
                }
                require_ref(table, key, &patients, &r.patient_id, WarehouseTable::DimPatient)?;
                require_ref(table, key, &providers, &r.provider_id, WarehouseTable::DimProvider)?;
                require_ref(
                    table,
                    key,
                    &departments,
                    &r.department_id,
                    WarehouseTable::DimDepartment,
                )?;
                require_ref(table, key, &days, &r.admit_date, WarehouseTable::DimTime)?;
                require_ref(table, key, &days, &r.discharge_date, WarehouseTable::DimTime)
            },
        )
    }

    async fn finalize_run(
        &mut self,
        run_id: RunId,
        status: RunStatus,
        notes: &str,
    ) -> Result<(), TransactionFailure> {
        let runs = self.runs.lock().await;
        match runs.iter().find(|e| e.run_id == run_id) {
            Some(entry) if !entry.status.is_final() => {
                self.pending_finalize = Some((run_id, status, notes.to_string()));
                Ok(())
            }
            _ => Err(TransactionFailure::Finalize(format!(
                "run {run_id} is not a running entry"
            ))),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), TransactionFailure> {
        if self.faults.fail_commit {
            return Err(TransactionFailure::Commit("commit failure injected".to_string()));
        }

        let mut committed = self.committed.lock().await;
        let mut runs = self.runs.lock().await;
        if let Some((run_id, status, notes)) = &self.pending_finalize {
            finalize_entry(&mut runs, *run_id, *status, notes).map_err(TransactionFailure::Commit)?;
        }
        let mut working = self.working.clone();
        working.normalize();
        *committed = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionFailure> {
        Ok(())
    }
}

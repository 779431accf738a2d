//! End-to-end build tests over the in-memory store

use async_trait::async_trait;
use clinistar::adapters::database::{StagingSource, StoreHandles};
use clinistar::adapters::memory::MemoryStore;
use clinistar::core::pipeline::{BuildOutcome, BuildPipeline, PipelineOptions};
use clinistar::core::runlog::RunStatus;
use clinistar::core::staging::{column_bag, ColumnBag, StagingRows, StagingTable};
use clinistar::core::validation::RuleId;
use clinistar::core::verification::referential_completeness;
use clinistar::domain::{Amount, EncounterId};
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;
use tokio::sync::watch;

/// Staging whose reads never complete
struct StalledStaging;

#[async_trait]
impl StagingSource for StalledStaging {
    async fn read_table(&self, _table: StagingTable) -> clinistar::domain::Result<Vec<ColumnBag>> {
        std::future::pending().await
    }

    async fn replace_tables(&self, _rows: &StagingRows) -> clinistar::domain::Result<()> {
        Ok(())
    }
}

fn patient(id: &str, birth_year: &str, sex: &str) -> (StagingTable, clinistar::core::staging::ColumnBag) {
    (
        StagingTable::CsvPatients,
        column_bag([
            ("patient_id", Some(id.to_string())),
            ("birth_year", Some(birth_year.to_string())),
            ("sex", Some(sex.to_string())),
        ]),
    )
}

fn encounter(
    id: &str,
    patient_id: &str,
    provider_id: &str,
    department_id: &str,
    admit: &str,
    discharge: &str,
) -> (StagingTable, clinistar::core::staging::ColumnBag) {
    (
        StagingTable::CsvEncounters,
        column_bag([
            ("encounter_id", Some(id.to_string())),
            ("patient_id", Some(patient_id.to_string())),
            ("provider_id", Some(provider_id.to_string())),
            ("department_id", Some(department_id.to_string())),
            ("admit_ts", Some(admit.to_string())),
            ("discharge_ts", Some(discharge.to_string())),
            ("encounter_type", Some("inpatient".to_string())),
        ]),
    )
}

fn charge(id: &str, encounter_id: &str, amount: &str) -> (StagingTable, clinistar::core::staging::ColumnBag) {
    (
        StagingTable::CsvCharges,
        column_bag([
            ("charge_id", Some(id.to_string())),
            ("encounter_id", Some(encounter_id.to_string())),
            ("cpt_code", Some("99213".to_string())),
            ("amount", Some(amount.to_string())),
            ("posted_ts", None),
        ]),
    )
}

fn staging(rows: Vec<(StagingTable, clinistar::core::staging::ColumnBag)>) -> StagingRows {
    let mut staging = StagingRows::default();
    for (table, row) in rows {
        staging.push(table, row);
    }
    staging
}

/// Two patients, two encounters, three charges
fn clean_staging() -> StagingRows {
    staging(vec![
        patient("P1", "1980", "F"),
        patient("P2", "1975", "M"),
        encounter("E1", "P1", "DR1", "CARD", "2024-03-01 08:00:00", "2024-03-04 10:00:00"),
        encounter("E2", "P2", "DR2", "ORTH", "2024-03-02 09:30:00", "2024-03-02 17:00:00"),
        charge("C1", "E1", "100.00"),
        charge("C2", "E1", "50.00"),
        charge("C3", "E2", "75.25"),
    ])
}

fn pipeline(store: MemoryStore, options: PipelineOptions) -> BuildPipeline {
    let stores = StoreHandles::shared(Arc::new(store));
    BuildPipeline::new(stores.staging, stores.run_log, stores.warehouse, options)
}

#[tokio::test]
async fn test_clean_build_commits_star_schema() {
    let store = MemoryStore::with_staging(clean_staging());
    let summary = pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, BuildOutcome::Committed);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.staged_records, 7);

    let warehouse = store.committed().await;
    assert_eq!(warehouse.patients.len(), 2);
    assert_eq!(warehouse.providers.len(), 2);
    assert_eq!(warehouse.departments.len(), 2);
    assert_eq!(warehouse.facts.len(), 2);

    let e1 = warehouse
        .facts
        .iter()
        .find(|f| f.encounter_id.as_str() == "E1")
        .unwrap();
    assert_eq!(e1.length_of_stay_days, 3);
    assert_eq!(e1.total_charges, Amount::from_cents(15000));
    assert_eq!(e1.total_charges.to_string(), "150.00");

    let e2 = warehouse
        .facts
        .iter()
        .find(|f| f.encounter_id.as_str() == "E2")
        .unwrap();
    assert_eq!(e2.length_of_stay_days, 0);
    assert_eq!(e2.total_charges, Amount::from_cents(7525));

    // admit and discharge days of both encounters: 03-01, 03-02, 03-04
    assert_eq!(warehouse.time_days.len(), 3);
    assert!(referential_completeness(&warehouse).is_empty());

    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert!(runs[0].finished_at.is_some());
    assert!(runs[0]
        .notes
        .as_deref()
        .unwrap()
        .starts_with("success: 2 encounters, 2 patients, 2 providers, 2 departments, 3 days"));
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let store = MemoryStore::with_staging(clean_staging());

    let first = pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();
    let after_first = store.committed().await;

    let second = pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();
    let after_second = store.committed().await;

    assert_eq!(first.outcome, BuildOutcome::Committed);
    assert_eq!(second.outcome, BuildOutcome::Committed);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(after_first, after_second);

    let runs = store.runs().await;
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
}

#[test_case(
    charge("C9", "99", "10.00"),
    RuleId::ReferentialIntegrity;
    "charge for unknown encounter"
)]
#[test_case(
    encounter("E1", "P1", "DR1", "CARD", "2024-03-05 08:00:00", "2024-03-06 08:00:00"),
    RuleId::DuplicateKey;
    "duplicate encounter"
)]
#[test_case(
    charge("C9", "E2", "-20.00"),
    RuleId::FinancialValidity;
    "negative charge"
)]
#[test_case(
    encounter("E3", "P1", "DR1", "CARD", "2024-03-10 08:00:00", "2024-03-09 08:00:00"),
    RuleId::TemporalConsistency;
    "discharge before admit"
)]
#[tokio::test]
async fn test_fatal_issue_blocks_build(
    extra: (StagingTable, clinistar::core::staging::ColumnBag),
    expected_rule: RuleId,
) {
    let mut rows = clean_staging();
    rows.push(extra.0, extra.1);

    // An earlier good build must survive the blocked one
    let store = MemoryStore::with_staging(clean_staging());
    pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();
    let before = store.committed().await;

    let blocked = MemoryStore::with_staging(rows);
    let summary = pipeline(blocked.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, BuildOutcome::ValidationFailed);
    assert_eq!(summary.exit_code(), 3);
    assert!(summary.fingerprint.is_none());
    assert!(summary
        .validation
        .fatal_issues()
        .any(|issue| issue.rule_id == expected_rule));

    assert!(blocked.committed().await.is_empty());
    assert_eq!(store.committed().await, before);

    let runs = blocked.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0]
        .notes
        .as_deref()
        .unwrap()
        .starts_with("validation failed:"));
}

#[tokio::test]
async fn test_failed_fact_insert_leaves_previous_warehouse() {
    let store = MemoryStore::with_staging(clean_staging());
    pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();
    let before = store.committed().await;

    // Reload staging with a third encounter, then fail on its fact row
    let mut rows = clean_staging();
    let (table, row) = encounter("E3", "P2", "DR2", "ORTH", "2024-03-08 08:00:00", "2024-03-09 08:00:00");
    rows.push(table, row);
    store.replace_tables(&rows).await.unwrap();

    let faulty = store
        .clone()
        .with_fact_insert_failure(EncounterId::new("E3").unwrap());
    let summary = pipeline(faulty, PipelineOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, BuildOutcome::RolledBack);
    assert_eq!(summary.exit_code(), 5);
    assert!(summary.rows.is_empty());
    assert!(summary.error.is_some());
    assert_eq!(store.committed().await, before);

    let runs = store.runs().await;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[1].status, RunStatus::Failed);
    assert!(runs[1]
        .notes
        .as_deref()
        .unwrap()
        .starts_with("commit rolled back:"));
}

#[tokio::test]
async fn test_commit_failure_rolls_back() {
    let store = MemoryStore::with_staging(clean_staging());
    let summary = pipeline(store.clone().with_commit_failure(), PipelineOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, BuildOutcome::RolledBack);
    assert!(store.committed().await.is_empty());
    assert_eq!(store.runs().await[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_begin_failure_rolls_back() {
    let store = MemoryStore::with_staging(clean_staging());
    let summary = pipeline(store.clone().with_begin_failure(), PipelineOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, BuildOutcome::RolledBack);
    assert!(summary.error.as_deref().unwrap().contains("begin"));
    assert!(store.committed().await.is_empty());
    assert_eq!(store.runs().await[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_lock_contention_rolls_back() {
    let store = MemoryStore::with_staging(clean_staging());
    let _held = store.hold_table_lock().await;

    let summary = pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, BuildOutcome::RolledBack);
    assert!(store.committed().await.is_empty());

    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_shutdown_during_staging_finalizes_run() {
    let store = MemoryStore::new();
    let stores = StoreHandles::shared(Arc::new(store.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = BuildPipeline::new(
        Arc::new(StalledStaging),
        stores.run_log,
        stores.warehouse,
        PipelineOptions::default(),
    )
    .with_shutdown_signal(shutdown_rx);

    let (summary, ()) = tokio::join!(pipeline.run(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
    });
    let summary = summary.unwrap();

    assert_eq!(summary.outcome, BuildOutcome::Cancelled);
    assert_eq!(summary.exit_code(), 5);
    assert!(store.committed().await.is_empty());

    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].finished_at.is_some());
    assert_eq!(runs[0].notes.as_deref(), Some("cancelled by signal"));
}

#[tokio::test]
async fn test_shutdown_before_commit_keeps_previous_warehouse() {
    let store = MemoryStore::with_staging(clean_staging());
    pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();
    let before = store.committed().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();
    let summary = pipeline(store.clone(), PipelineOptions::default())
        .with_shutdown_signal(shutdown_rx)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, BuildOutcome::Cancelled);
    assert!(summary.rows.is_empty());
    assert_eq!(store.committed().await, before);

    let runs = store.runs().await;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].status, RunStatus::Failed);
    assert_eq!(runs[1].notes.as_deref(), Some("cancelled by signal"));
}

#[tokio::test]
async fn test_unknown_patient_aborts_build() {
    let store = MemoryStore::with_staging(clean_staging());
    pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();
    let before = store.committed().await;

    // E1 still references P1, which is no longer staged
    let rows = staging(vec![
        patient("P2", "1975", "M"),
        encounter("E1", "P1", "DR1", "CARD", "2024-03-01 08:00:00", "2024-03-04 10:00:00"),
        encounter("E2", "P2", "DR2", "ORTH", "2024-03-02 09:30:00", "2024-03-02 17:00:00"),
        charge("C1", "E1", "100.00"),
    ]);
    store.replace_tables(&rows).await.unwrap();

    let summary = pipeline(store.clone(), PipelineOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, BuildOutcome::BuildAborted);
    assert_eq!(summary.exit_code(), 5);
    assert!(summary.validation.passed);
    assert!(summary.error.as_deref().unwrap().contains("P1"));
    assert_eq!(store.committed().await, before);

    let runs = store.runs().await;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].status, RunStatus::Failed);
    assert!(runs[1]
        .notes
        .as_deref()
        .unwrap()
        .starts_with("build aborted:"));
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let store = MemoryStore::with_staging(clean_staging());
    let options = PipelineOptions {
        dry_run: true,
        ..PipelineOptions::default()
    };

    let summary = pipeline(store.clone(), options).run().await.unwrap();

    assert_eq!(summary.outcome, BuildOutcome::DryRun);
    assert_eq!(summary.exit_code(), 0);
    assert!(summary.run_id.is_none());
    assert!(summary.fingerprint.is_some());
    assert_eq!(summary.total_rows(), 2 + 2 + 2 + 3 + 2);
    assert!(store.committed().await.is_empty());
    assert!(store.runs().await.is_empty());
}

#[tokio::test]
async fn test_verification_after_commit() {
    let store = MemoryStore::with_staging(clean_staging());
    let options = PipelineOptions {
        verify: true,
        ..PipelineOptions::default()
    };

    let summary = pipeline(store, options).run().await.unwrap();

    assert_eq!(summary.outcome, BuildOutcome::Committed);
    let report = summary.verification_report.unwrap();
    assert!(report.is_success());
    assert!(report.fingerprint_matches());
    assert_eq!(Some(report.expected_fingerprint), summary.fingerprint);
}

#[tokio::test]
async fn test_validate_staging_writes_nothing() {
    let mut rows = clean_staging();
    let (table, row) = charge("C9", "99", "10.00");
    rows.push(table, row);
    let store = MemoryStore::with_staging(rows);

    let (staged, result) = pipeline(store.clone(), PipelineOptions::default())
        .validate_staging()
        .await
        .unwrap();

    assert_eq!(staged.len(), 8);
    assert!(!result.passed);
    assert_eq!(result.fatal_count(), 1);
    assert!(store.runs().await.is_empty());
}

#[tokio::test]
async fn test_undecodable_staging_fails_the_run() {
    let mut rows = clean_staging();
    let (table, row) = charge("C9", "E1", "ten dollars");
    rows.push(table, row);
    let store = MemoryStore::with_staging(rows);

    let result = pipeline(store.clone(), PipelineOptions::default()).run().await;

    assert!(result.is_err());
    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].notes.as_deref().unwrap().starts_with("staging failed:"));
}

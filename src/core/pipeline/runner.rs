//! Build pipeline - main orchestrator for a warehouse build
//!
//! Staging → validation → build → commit, with the run log recording the
//! outcome of every attempt that gets past `begin_run`.

use crate::adapters::database::traits::{RunLogStore, StagingSource, WarehouseStore};
use crate::config::{ClinistarConfig, StagingSourceMode};
use crate::core::build::build;
use crate::core::commit::TransactionCoordinator;
use crate::core::pipeline::summary::{BuildOutcome, BuildSummary};
use crate::core::runlog::{RunLogger, RunStatus};
use crate::core::staging::StagingLoader;
use crate::core::validation::{validate, RuleCatalog, ValidatedRecords, ValidationResult};
use crate::core::verification::checksum::{fingerprint, short};
use crate::core::verification::Verifier;
use crate::domain::ids::RunId;
use crate::domain::records::StagedBatch;
use crate::domain::warehouse::{WarehouseDelta, WarehouseTable};
use crate::domain::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

const RUN_NOTES: &str = "validate + build warehouse";
const CANCELLED_NOTES: &str = "cancelled by signal";

/// Settings a pipeline run needs from the configuration
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source: StagingSourceMode,
    pub rules: RuleCatalog,

    /// Fatal issues summarised in the run log notes of a failed validation
    pub max_reported_issues: usize,

    /// Read the warehouse back after commit
    pub verify: bool,

    /// Validate and derive without writing anything
    pub dry_run: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &ClinistarConfig) -> Self {
        Self {
            source: config.staging.source,
            rules: RuleCatalog::from_config(&config.validation),
            max_reported_issues: config.validation.max_reported_issues,
            verify: config.verification.enable_verification,
            dry_run: config.application.dry_run,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            source: StagingSourceMode::Csv,
            rules: RuleCatalog::default(),
            max_reported_issues: 5,
            verify: false,
            dry_run: false,
        }
    }
}

/// Build pipeline over explicit store handles
pub struct BuildPipeline {
    loader: StagingLoader,
    run_logger: RunLogger,
    coordinator: TransactionCoordinator,
    verifier: Verifier,
    options: PipelineOptions,
    shutdown: Option<watch::Receiver<bool>>,
}

impl BuildPipeline {
    pub fn new(
        staging: Arc<dyn StagingSource + Send + Sync>,
        run_log: Arc<dyn RunLogStore + Send + Sync>,
        warehouse: Arc<dyn WarehouseStore + Send + Sync>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            loader: StagingLoader::new(staging),
            run_logger: RunLogger::new(run_log),
            coordinator: TransactionCoordinator::new(warehouse.clone()),
            verifier: Verifier::new(warehouse),
            options,
            shutdown: None,
        }
    }

    /// Stop the build before commit once `shutdown` turns true
    ///
    /// A commit that has already started always runs to completion.
    pub fn with_shutdown_signal(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Load staging and validate it, writing nothing
    ///
    /// # Errors
    ///
    /// Returns an error if staging cannot be read or decoded.
    pub async fn validate_staging(&self) -> Result<(StagedBatch, ValidationResult)> {
        let staged = self.loader.load(self.options.source).await?;
        let result = validate(&staged, &self.options.rules);
        Ok((staged, result))
    }

    /// Execute one build attempt
    ///
    /// Validation failures, build aborts, rollbacks and cancellation are
    /// reported through the returned summary; each of them finalizes the run
    /// as `failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the run log cannot be written, or if staging
    /// cannot be loaded (the run is finalized as `failed` first).
    pub async fn run(&self) -> Result<BuildSummary> {
        let started = Instant::now();

        if self.options.dry_run {
            tracing::info!("Dry run mode enabled - no data will be written");
            let mut summary = BuildSummary::new(self.options.source, None);
            let Some(loaded) = self.load_unless_cancelled().await else {
                return self.cancel(summary, started).await;
            };
            let (staged, validation) = loaded?;
            self.derive(&mut summary, &staged, validation);
            summary.duration = started.elapsed();
            summary.log_summary();
            return Ok(summary);
        }

        let run_id = self.run_logger.begin_run(RUN_NOTES).await?;
        let mut summary = BuildSummary::new(self.options.source, Some(run_id));

        let (staged, validation) = match self.load_unless_cancelled().await {
            Some(Ok(loaded)) => loaded,
            Some(Err(e)) => {
                self.fail(run_id, &format!("staging failed: {e}")).await?;
                return Err(e);
            }
            None => return self.cancel(summary, started).await,
        };

        let delta = self.derive(&mut summary, &staged, validation);
        if delta.is_some() && self.shutdown_requested() {
            return self.cancel(summary, started).await;
        }
        let notes = match (&delta, summary.outcome) {
            (Some(delta), _) => self.commit(&mut summary, delta, run_id).await?,
            (None, BuildOutcome::ValidationFailed) => {
                Some(summary.validation.failure_notes(self.options.max_reported_issues))
            }
            (None, _) => Some(format!(
                "build aborted: {}",
                summary.error.as_deref().unwrap_or("unknown")
            )),
        };

        if let Some(notes) = notes {
            self.fail(run_id, &notes).await?;
        }

        if let (Some(delta), BuildOutcome::Committed, true) =
            (&delta, summary.outcome, self.options.verify)
        {
            if self.shutdown_requested() {
                tracing::warn!("Shutdown requested, skipping verification");
                summary.duration = started.elapsed();
                summary.log_summary();
                return Ok(summary);
            }
            let report = self.verifier.verify(delta).await?;
            if !report.is_success() {
                summary.outcome = BuildOutcome::VerificationFailed;
            }
            summary.verification_report = Some(report);
        }

        summary.duration = started.elapsed();
        summary.log_summary();
        Ok(summary)
    }

    /// Validates and builds; sets the outcome when either blocks
    fn derive(
        &self,
        summary: &mut BuildSummary,
        staged: &StagedBatch,
        validation: ValidationResult,
    ) -> Option<WarehouseDelta> {
        summary.staged_records = staged.len();
        summary.validation = validation;

        let validated = match ValidatedRecords::accept(staged, &summary.validation) {
            Ok(validated) => validated,
            Err(_) => {
                tracing::warn!(
                    fatal_issues = summary.validation.fatal_count(),
                    "Validation failed, build blocked"
                );
                summary.outcome = BuildOutcome::ValidationFailed;
                return None;
            }
        };

        match build(&validated) {
            Ok(delta) => {
                summary.rows = WarehouseTable::LOAD_ORDER
                    .iter()
                    .map(|t| (*t, delta.row_count(*t)))
                    .collect();
                summary.fingerprint = fingerprint(&delta).ok();
                Some(delta)
            }
            Err(abort) => {
                tracing::error!(error = %abort, "Warehouse build aborted");
                summary.outcome = BuildOutcome::BuildAborted;
                summary.error = Some(abort.to_string());
                None
            }
        }
    }

    /// Commits the delta; returns failure notes when it was rolled back
    async fn commit(
        &self,
        summary: &mut BuildSummary,
        delta: &WarehouseDelta,
        run_id: RunId,
    ) -> Result<Option<String>> {
        let fp = match &summary.fingerprint {
            Some(fp) => fp.clone(),
            None => fingerprint(delta)?,
        };
        let notes = format!(
            "success: {} encounters, {} patients, {} providers, {} departments, {} days; fingerprint {}",
            delta.facts.len(),
            delta.patients.len(),
            delta.providers.len(),
            delta.departments.len(),
            delta.time_days.len(),
            short(&fp)
        );

        let result = self.coordinator.commit(delta, run_id, &notes).await;
        if result.is_committed() {
            summary.outcome = BuildOutcome::Committed;
            return Ok(None);
        }

        let error = result
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        summary.outcome = BuildOutcome::RolledBack;
        summary.rows.clear();
        summary.error = Some(error.clone());
        Ok(Some(format!("commit rolled back: {error}")))
    }

    async fn fail(&self, run_id: RunId, notes: &str) -> Result<()> {
        self.run_logger.end_run(run_id, RunStatus::Failed, notes).await
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Loads and validates staging; `None` when shutdown arrives first
    async fn load_unless_cancelled(&self) -> Option<Result<(StagedBatch, ValidationResult)>> {
        let Some(shutdown) = self.shutdown.clone() else {
            return Some(self.validate_staging().await);
        };

        tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => None,
            loaded = self.validate_staging() => Some(loaded),
        }
    }

    /// Finalizes the run as cancelled; nothing reaches the warehouse
    async fn cancel(&self, mut summary: BuildSummary, started: Instant) -> Result<BuildSummary> {
        tracing::warn!("Shutdown requested, build stopped before commit");
        if let Some(run_id) = summary.run_id {
            self.fail(run_id, CANCELLED_NOTES).await?;
        }

        summary.outcome = BuildOutcome::Cancelled;
        summary.rows.clear();
        summary.error = Some(CANCELLED_NOTES.to_string());
        summary.duration = started.elapsed();
        summary.log_summary();
        Ok(summary)
    }
}

/// Resolves once the flag turns true; never if the sender is gone
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

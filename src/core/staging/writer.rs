//! Staging writes
//!
//! CSV and FHIR staging both replace their tables under a run log entry of
//! their own, separate from any build run.

use crate::adapters::database::traits::StagingSource;
use crate::core::runlog::{RunLogger, RunStatus};
use crate::core::staging::tables::StagingRows;
use crate::domain::ids::RunId;
use crate::domain::Result;

/// Replaces the staging tables in `rows` under a new run log entry
///
/// The entry is opened with `run_notes` and finalized as `success` with
/// `success_notes`, or as `failed` with the write error.
///
/// # Errors
///
/// Returns an error if the run log cannot be written, or if the staging
/// write fails (the run is finalized as `failed` first).
pub async fn replace_under_run(
    staging: &(dyn StagingSource + Send + Sync),
    run_logger: &RunLogger,
    run_notes: &str,
    rows: &StagingRows,
    success_notes: &str,
) -> Result<RunId> {
    let run_id = run_logger.begin_run(run_notes).await?;

    if let Err(e) = staging.replace_tables(rows).await {
        run_logger
            .end_run(
                run_id,
                RunStatus::Failed,
                &format!("{run_notes} failed: {e}"),
            )
            .await?;
        return Err(e);
    }

    tracing::info!(
        run_id = %run_id,
        tables = rows.tables.len(),
        rows = rows.total_rows(),
        "Staging tables replaced"
    );
    run_logger
        .end_run(run_id, RunStatus::Success, success_notes)
        .await?;
    Ok(run_id)
}

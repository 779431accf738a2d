//! Stage FHIR command implementation
//!
//! Loads a directory of FHIR bundles into the `stg_fhir_*` tables.

use crate::adapters::database::create_stores;
use crate::adapters::fhir::FhirIngestor;
use crate::config::load_config;
use crate::core::runlog::RunLogger;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the stage-fhir command
#[derive(Args, Debug)]
pub struct StageFhirArgs {
    /// Bundle directory (defaults to staging.fhir_bundle_dir)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

impl StageFhirArgs {
    /// Execute the stage-fhir command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let dir = self
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.staging.fhir_bundle_dir));

        tracing::info!(dir = %dir.display(), "Staging FHIR bundles");
        println!("📥 Staging FHIR bundles from {}", dir.display());
        println!();

        let stores = match create_stores(&config.database).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let ingestor = FhirIngestor::new(stores.staging, RunLogger::new(stores.run_log));
        match ingestor.stage_directory(&dir).await {
            Ok(report) => {
                println!("✅ {}", report.notes());
                println!("   Run: #{}", report.run_id);
                Ok(0)
            }
            Err(e) => {
                crate::log_error_with_context!(e, "FHIR staging failed");
                println!("❌ FHIR staging failed");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}

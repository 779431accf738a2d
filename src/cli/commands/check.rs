//! Validate command implementation
//!
//! Validates staging without building or writing anything.

use crate::adapters::database::create_stores;
use crate::config::load_config;
use crate::core::pipeline::{BuildPipeline, PipelineOptions};
use clap::Args;

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct CheckArgs {}

impl CheckArgs {
    /// Execute the validate command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        tracing::info!(source = %config.staging.source, "Validating staging");
        println!("🔍 Validating staging ({})", config.staging.source);
        println!();

        let stores = match create_stores(&config.database).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let pipeline = BuildPipeline::new(
            stores.staging,
            stores.run_log,
            stores.warehouse,
            PipelineOptions::from_config(&config),
        );

        match pipeline.validate_staging().await {
            Ok((staged, result)) => {
                println!("Staged records: {}", staged.len());
                println!("{}", result.format_report());
                Ok(if result.passed { 0 } else { 3 })
            }
            Err(e) => {
                println!("❌ Failed to load staging");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}

//! Stage CSV command implementation
//!
//! Loads a directory of CSV extracts into the CSV `stg_*` tables.

use crate::adapters::database::create_stores;
use crate::adapters::extracts::CsvIngestor;
use crate::config::load_config;
use crate::core::runlog::RunLogger;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the stage-csv command
#[derive(Args, Debug)]
pub struct StageCsvArgs {
    /// Extract directory (defaults to staging.csv_extract_dir)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

impl StageCsvArgs {
    /// Execute the stage-csv command
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
            .unwrap_or_else(|| PathBuf::from(&config.staging.csv_extract_dir));

        tracing::info!(dir = %dir.display(), "Staging CSV extracts");
        println!("📥 Staging CSV extracts from {}", dir.display());
        println!();

        let stores = match create_stores(&config.database).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let ingestor = CsvIngestor::new(stores.staging, RunLogger::new(stores.run_log));
        match ingestor.stage_directory(&dir).await {
            Ok(report) => {
                println!("✅ {}", report.notes());
                for (table, rows) in &report.rows.tables {
                    println!("   {table}: {} rows", rows.len());
                }
                println!("   Run: #{}", report.run_id);
                Ok(0)
            }
            Err(e) => {
                crate::log_error_with_context!(e, "CSV staging failed");
                println!("❌ CSV staging failed");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}

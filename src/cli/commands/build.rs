//! Build command implementation
//!
//! Validates staging, derives the star schema and commits it atomically.

use crate::adapters::database::create_stores;
use crate::config::load_config;
use crate::core::pipeline::{BuildPipeline, PipelineOptions};
use clap::Args;
use tokio::sync::watch;

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Validate and derive without writing to the database
    #[arg(long)]
    pub dry_run: bool,
}

impl BuildArgs {
    /// Execute the build command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let mut options = PipelineOptions::from_config(&config);
        options.dry_run |= self.dry_run;

        tracing::info!(
            source = %options.source,
            dry_run = options.dry_run,
            verify = options.verify,
            "Starting warehouse build"
        );
        println!("🚀 Building warehouse from {} staging", options.source);
        if options.dry_run {
            println!("   (dry run: nothing will be written)");
        }
        println!();

        let stores = match create_stores(&config.database).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let pipeline =
            BuildPipeline::new(stores.staging, stores.run_log, stores.warehouse, options)
                .with_shutdown_signal(shutdown_signal);

        let summary = match pipeline.run().await {
            Ok(summary) => summary,
            Err(e) => {
                crate::log_error_with_context!(e, "Warehouse build failed");
                println!("❌ Build failed");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        println!("{}", summary.format_summary());
        if !summary.validation.issues.is_empty() {
            println!("{}", summary.validation.format_report());
        }
        if let Some(report) = &summary.verification_report {
            println!("{}", report.format_summary());
        }

        Ok(summary.exit_code())
    }
}

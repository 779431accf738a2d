//! Status command implementation
//!
//! Lists the most recent run log entries.

use crate::adapters::database::create_stores;
use crate::config::load_config;
use crate::core::runlog::{RunLogger, RunStatus};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Number of entries to show
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(limit = self.limit, "Checking run history");

        println!("📊 Run History");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let stores = match create_stores(&config.database).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let entries = match RunLogger::new(stores.run_log).recent_runs(self.limit).await {
            Ok(entries) => entries,
            Err(e) => {
                println!("❌ Failed to read run log");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if entries.is_empty() {
            println!("No runs recorded.");
            println!("Run 'clinistar build' to build the warehouse.");
            return Ok(0);
        }

        println!("Last {} run(s):", entries.len());
        println!();
        for entry in &entries {
            println!("{}", entry.summary_line());
        }

        let running = entries
            .iter()
            .filter(|e| e.status == RunStatus::Running)
            .count();
        if running > 0 {
            println!();
            println!("⚠️  {running} run(s) never finalized; the process may have been interrupted");
        }

        Ok(0)
    }
}

//! Init schema command implementation
//!
//! Creates the staging, warehouse and run log tables if they are absent.

use crate::adapters::database::create_stores;
use crate::config::load_config;
use clap::Args;

/// Arguments for the init-schema command
#[derive(Args, Debug)]
pub struct InitSchemaArgs {}

impl InitSchemaArgs {
    /// Execute the init-schema command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Bootstrapping database schema");

        println!("🏗️  Initializing database schema");
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

        match stores.warehouse.ensure_schema().await {
            Ok(()) => {
                println!("✅ Schema is in place");
                Ok(0)
            }
            Err(e) => {
                tracing::error!(error = %e, "Schema bootstrap failed");
                println!("❌ Failed to create schema");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}

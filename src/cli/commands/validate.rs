//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Clinistar configuration file.

use crate::config::load_config;
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!(
            "  Database: {}",
            config.database.connection_string.expose_secret().redacted()
        );
        println!("  Max Connections: {}", config.database.max_connections);
        println!(
            "  Statement Timeout: {}s",
            config.database.statement_timeout_seconds
        );
        println!("  Lock Timeout: {}s", config.database.lock_timeout_seconds);
        println!("  SSL Mode: {}", config.database.ssl_mode);
        println!("  Staging Source: {}", config.staging.source);
        println!("  CSV Extract Dir: {}", config.staging.csv_extract_dir);
        println!("  FHIR Bundle Dir: {}", config.staging.fhir_bundle_dir);
        println!(
            "  Max Reported Issues: {}",
            config.validation.max_reported_issues
        );
        println!("  Fail On Warnings: {}", config.validation.fail_on_warnings);
        println!(
            "  Verification: {}",
            if config.verification.enable_verification {
                "enabled"
            } else {
                "disabled"
            }
        );
        if config.logging.local_enabled {
            println!(
                "  Log Files: {} ({})",
                config.logging.local_path, config.logging.local_rotation
            );
        }
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let args = ValidateArgs {};
        let code = args
            .execute("/nonexistent/clinistar.toml")
            .await
            .unwrap();
        assert_eq!(code, 2);
    }

    #[tokio::test]
    async fn test_invalid_ssl_mode_is_configuration_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\nconnection_string = \"postgresql://etl@localhost/dw\"\nssl_mode = \"require\""
        )
        .unwrap();

        let args = ValidateArgs {};
        let code = args.execute(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(code, 2);
    }
}

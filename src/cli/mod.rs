//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Clinistar using clap.

pub mod commands;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

/// Clinistar - Healthcare Star-Schema Warehouse Builder
#[derive(Parser, Debug)]
#[command(name = "clinistar")]
#[command(version, about, long_about = None)]
#[command(author = "Clinistar Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "clinistar.toml", env = "CLINISTAR_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CLINISTAR_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate staging, build the star schema and commit it
    Build(commands::build::BuildArgs),

    /// Validate staging without building
    Validate(commands::check::CheckArgs),

    /// Load a directory of CSV extracts into the CSV staging tables
    StageCsv(commands::stage_csv::StageCsvArgs),

    /// Load a directory of FHIR bundles into the FHIR staging tables
    StageFhir(commands::stage_fhir::StageFhirArgs),

    /// Create staging, warehouse and run log tables
    InitSchema(commands::init_schema::InitSchemaArgs),

    /// Show recent run log entries
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Execute the selected command and return its exit code
    ///
    /// Only `build` observes `shutdown_signal`; the other commands run to
    /// completion.
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        match self {
            Commands::Build(args) => args.execute(config_path, shutdown_signal).await,
            Commands::Validate(args) => args.execute(config_path).await,
            Commands::StageCsv(args) => args.execute(config_path).await,
            Commands::StageFhir(args) => args.execute(config_path).await,
            Commands::InitSchema(args) => args.execute(config_path).await,
            Commands::Status(args) => args.execute(config_path).await,
            Commands::ValidateConfig(args) => args.execute(config_path).await,
            Commands::Init(args) => args.execute().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_build() {
        let cli = Cli::parse_from(["clinistar", "build"]);
        assert_eq!(cli.config, "clinistar.toml");
        assert!(matches!(cli.command, Commands::Build(ref args) if !args.dry_run));
    }

    #[test]
    fn test_cli_parse_build_dry_run() {
        let cli = Cli::parse_from(["clinistar", "build", "--dry-run"]);
        assert!(matches!(cli.command, Commands::Build(ref args) if args.dry_run));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["clinistar", "--config", "custom.toml", "build"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["clinistar", "--log-level", "debug", "validate"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Validate(_)));
    }

    #[test]
    fn test_cli_parse_stage_fhir() {
        let cli = Cli::parse_from(["clinistar", "stage-fhir", "--dir", "bundles"]);
        match cli.command {
            Commands::StageFhir(args) => {
                assert_eq!(args.dir, Some(std::path::PathBuf::from("bundles")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_stage_csv() {
        let cli = Cli::parse_from(["clinistar", "stage-csv"]);
        assert!(matches!(cli.command, Commands::StageCsv(ref args) if args.dir.is_none()));

        let cli = Cli::parse_from(["clinistar", "stage-csv", "--dir", "data/raw"]);
        match cli.command {
            Commands::StageCsv(args) => {
                assert_eq!(args.dir, Some(std::path::PathBuf::from("data/raw")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_init_schema() {
        let cli = Cli::parse_from(["clinistar", "init-schema"]);
        assert!(matches!(cli.command, Commands::InitSchema(_)));
    }

    #[test]
    fn test_cli_parse_status_limit() {
        let cli = Cli::parse_from(["clinistar", "status"]);
        assert!(matches!(cli.command, Commands::Status(ref args) if args.limit == 10));

        let cli = Cli::parse_from(["clinistar", "status", "--limit", "3"]);
        assert!(matches!(cli.command, Commands::Status(ref args) if args.limit == 3));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["clinistar", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["clinistar", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}

//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::ClinistarConfig;
use crate::config::secret_string;
use crate::domain::errors::ClinistarError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ClinistarConfig
/// 4. Applies environment variable overrides (CLINISTAR_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns `ClinistarError::Configuration` if the file is missing or
/// unreadable, a referenced variable is unset, the TOML is malformed, or a
/// section fails validation.
///
/// # Examples
///
/// ```no_run
/// use clinistar::config::load_config;
///
/// let config = load_config("clinistar.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ClinistarConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ClinistarError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ClinistarError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: ClinistarConfig = toml::from_str(&contents)
        .map_err(|e| ClinistarError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ClinistarError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ClinistarError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut missing_vars: Vec<String> = Vec::new();

    let lines: Vec<String> = input
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                return line.to_string();
            }
            re.replace_all(line, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                match std::env::var(name) {
                    Ok(value) => value,
                    Err(_) => {
                        if !missing_vars.iter().any(|m| m == name) {
                            missing_vars.push(name.to_string());
                        }
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
        })
        .collect();

    if !missing_vars.is_empty() {
        return Err(ClinistarError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(val) => val.trim().parse().map(Some).map_err(|_| {
            ClinistarError::Configuration(format!("Invalid value for {name}: '{val}'"))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using CLINISTAR_* prefix
///
/// Environment variables follow the pattern: CLINISTAR_<SECTION>_<KEY>
/// For example: CLINISTAR_DATABASE_CONNECTION_STRING, CLINISTAR_STAGING_SOURCE
fn apply_env_overrides(config: &mut ClinistarConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("CLINISTAR_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parse("CLINISTAR_APPLICATION_DRY_RUN")? {
        config.application.dry_run = val;
    }

    // Database overrides
    if let Ok(val) = std::env::var("CLINISTAR_DATABASE_CONNECTION_STRING") {
        config.database.connection_string = secret_string(val);
    }
    if let Some(val) = env_parse("CLINISTAR_DATABASE_MAX_CONNECTIONS")? {
        config.database.max_connections = val;
    }
    if let Some(val) = env_parse("CLINISTAR_DATABASE_STATEMENT_TIMEOUT_SECONDS")? {
        config.database.statement_timeout_seconds = val;
    }
    if let Some(val) = env_parse("CLINISTAR_DATABASE_LOCK_TIMEOUT_SECONDS")? {
        config.database.lock_timeout_seconds = val;
    }

    // Staging overrides
    if let Ok(val) = std::env::var("CLINISTAR_STAGING_SOURCE") {
        config.staging.source = val.parse().map_err(ClinistarError::Configuration)?;
    }
    if let Ok(val) = std::env::var("CLINISTAR_STAGING_CSV_EXTRACT_DIR") {
        config.staging.csv_extract_dir = val;
    }
    if let Ok(val) = std::env::var("CLINISTAR_STAGING_FHIR_BUNDLE_DIR") {
        config.staging.fhir_bundle_dir = val;
    }

    // Validation overrides
    if let Some(val) = env_parse("CLINISTAR_VALIDATION_MAX_REPORTED_ISSUES")? {
        config.validation.max_reported_issues = val;
    }
    if let Some(val) = env_parse("CLINISTAR_VALIDATION_FAIL_ON_WARNINGS")? {
        config.validation.fail_on_warnings = val;
    }

    // Verification overrides
    if let Some(val) = env_parse("CLINISTAR_VERIFICATION_ENABLE_VERIFICATION")? {
        config.verification.enable_verification = val;
    }

    // Logging overrides
    if let Some(val) = env_parse("CLINISTAR_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("CLINISTAR_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

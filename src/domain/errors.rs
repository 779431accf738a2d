//! Domain error types
//!
//! This module defines the error hierarchy for Clinistar. Data-quality defects
//! are not errors: they are collected as [`ValidationIssue`](crate::core::validation::ValidationIssue)s.
//! Errors here are the conditions that end a run.

use crate::domain::records::EntityKind;
use crate::domain::warehouse::WarehouseTable;
use std::fmt;
use thiserror::Error;

/// Main Clinistar error type
#[derive(Debug, Error)]
pub enum ClinistarError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database-related errors (connection, pool, query)
    #[error("Database error: {0}")]
    Database(String),

    /// A staged row could not be decoded into its fixed schema
    #[error("Staging error: {0}")]
    Staging(String),

    /// Validation blocked the build
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal consistency defect found while deriving warehouse rows
    #[error(transparent)]
    Build(#[from] BuildAborted),

    /// Store-level failure inside the commit transaction
    #[error(transparent)]
    Transaction(#[from] TransactionFailure),

    /// Run log state errors
    #[error("Run log error: {0}")]
    State(String),

    /// FHIR bundle parsing errors
    #[error("FHIR ingest error: {0}")]
    Fhir(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Stage of the warehouse build at which an abort happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// Deduplicating dimension sources
    DimensionDerivation,
    /// Resolving fact foreign keys against derived dimensions
    KeyResolution,
    /// Computing length of stay and total charges
    MetricComputation,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::DimensionDerivation => "dimension_derivation",
            BuildStage::KeyResolution => "key_resolution",
            BuildStage::MetricComputation => "metric_computation",
        };
        f.write_str(name)
    }
}

/// The builder hit a row it cannot derive
///
/// Carries the unresolved key and the stage. A build that aborts never
/// returns a partial delta.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Build aborted at {stage}: {entity_kind} '{key}': {reason}")]
pub struct BuildAborted {
    /// Stage at which the build stopped
    pub stage: BuildStage,

    /// Kind of entity whose key could not be resolved
    pub entity_kind: EntityKind,

    /// The offending key
    pub key: String,

    /// Human-readable reason
    pub reason: String,
}

impl BuildAborted {
    /// Creates a new build abort
    pub fn new(
        stage: BuildStage,
        entity_kind: EntityKind,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            entity_kind,
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Store-level failure during the commit transaction
///
/// These errors don't expose the driver's error types; the message is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionFailure {
    /// The transaction could not be opened
    #[error("Failed to begin transaction: {0}")]
    Begin(String),

    /// Exclusive table locks could not be taken
    #[error("Failed to lock warehouse tables: {0}")]
    Lock(String),

    /// Truncating a table failed
    #[error("Failed to truncate {table}: {message}")]
    Truncate {
        table: WarehouseTable,
        message: String,
    },

    /// Inserting a row failed (constraint or connectivity)
    #[error("Failed to insert into {table} (key '{key}'): {message}")]
    Insert {
        table: WarehouseTable,
        key: String,
        message: String,
    },

    /// Run log finalization inside the transaction failed
    #[error("Failed to finalize run log: {0}")]
    Finalize(String),

    /// COMMIT failed
    #[error("Failed to commit transaction: {0}")]
    Commit(String),

    /// ROLLBACK failed
    #[error("Failed to roll back transaction: {0}")]
    Rollback(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for ClinistarError {
    fn from(err: std::io::Error) -> Self {
        ClinistarError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ClinistarError {
    fn from(err: serde_json::Error) -> Self {
        ClinistarError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ClinistarError {
    fn from(err: toml::de::Error) -> Self {
        ClinistarError::Configuration(format!("TOML parse error: {err}"))
    }
}

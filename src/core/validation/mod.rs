//! Data-quality validation of staged records
//!
//! The validator is a pure function over a [`StagedBatch`](crate::domain::StagedBatch):
//! it collects every [`ValidationIssue`] instead of failing on the first one.
//! A [`ValidationResult`] that passed is the only way to obtain
//! [`ValidatedRecords`], the input of the warehouse builder.

pub mod issue;
pub mod rules;
pub mod validator;

pub use issue::{ValidatedRecords, ValidationIssue, ValidationResult};
pub use rules::{Rule, RuleCatalog, RuleId, Severity};
pub use validator::validate;

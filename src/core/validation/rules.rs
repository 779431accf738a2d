//! Data-quality rule catalog
//!
//! The catalog is fixed: every rule has an id, an evaluation position and a
//! default severity. Configuration may escalate the warning rule to fatal or
//! switch it off; the fatal rules always run.

use crate::config::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the build
    Fatal,
    /// Recorded, does not block
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => f.write_str("fatal"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Rule identifiers, declared in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    /// Repeated patient_id among patient records, or encounter_id among encounters
    DuplicateKey,
    /// Negative charge amount
    FinancialValidity,
    /// Discharge before admit
    TemporalConsistency,
    /// Charge or lab referencing an encounter that is not staged
    ReferentialIntegrity,
    /// Provider or department seen again with different attributes
    DimensionConflict,
}

impl RuleId {
    /// All rules in evaluation order
    pub const ALL: [RuleId; 5] = [
        RuleId::DuplicateKey,
        RuleId::FinancialValidity,
        RuleId::TemporalConsistency,
        RuleId::ReferentialIntegrity,
        RuleId::DimensionConflict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::DuplicateKey => "duplicate_key",
            RuleId::FinancialValidity => "financial_validity",
            RuleId::TemporalConsistency => "temporal_consistency",
            RuleId::ReferentialIntegrity => "referential_integrity",
            RuleId::DimensionConflict => "dimension_conflict",
        }
    }

    /// Severity the rule carries unless configured otherwise
    pub fn default_severity(&self) -> Severity {
        match self {
            RuleId::DimensionConflict => Severity::Warning,
            _ => Severity::Fatal,
        }
    }

    /// Whether the rule may be switched off
    pub fn is_optional(&self) -> bool {
        self.default_severity() == Severity::Warning
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule with its effective severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub severity: Severity,
}

/// The set of rules a validation pass evaluates, in evaluation order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self {
            rules: RuleId::ALL
                .iter()
                .map(|id| Rule {
                    id: *id,
                    severity: id.default_severity(),
                })
                .collect(),
        }
    }
}

impl RuleCatalog {
    /// Builds the catalog from the `[validation]` configuration section
    pub fn from_config(config: &ValidationConfig) -> Self {
        let rules = RuleId::ALL
            .iter()
            .filter(|id| !(id.is_optional() && !config.dimension_conflict_enabled))
            .map(|id| {
                let severity = if config.fail_on_warnings {
                    Severity::Fatal
                } else {
                    id.default_severity()
                };
                Rule { id: *id, severity }
            })
            .collect();
        Self { rules }
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Effective severity of a rule, if it is in the catalog
    pub fn severity_of(&self, id: RuleId) -> Option<Severity> {
        self.rules.iter().find(|r| r.id == id).map(|r| r.severity)
    }
}

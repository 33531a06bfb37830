use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuditAnalyticsError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Record set has {count} rows, exceeding the limit of {limit}")]
    TooManyRecords { count: usize, limit: usize },

    #[error("Audit with id {0} not found")]
    AuditNotFound(Uuid),

    #[error("Audit {0} is already being evaluated")]
    ConcurrencyViolation(Uuid),

    #[error("Invalid audit status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Invalid optimization score {0}: must be between 0 and 100")]
    InvalidScore(u32),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuditAnalyticsError>;

/// Why a rule was skipped during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuleConfigurationIssue {
    NonNumericThreshold(String),
    UnknownOperator(String),
    EmptyField,
}

impl std::fmt::Display for RuleConfigurationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonNumericThreshold(raw) => write!(f, "threshold '{}' is not numeric", raw),
            Self::UnknownOperator(raw) => write!(f, "operator '{}' is not supported", raw),
            Self::EmptyField => write!(f, "condition field is empty"),
        }
    }
}

/// A non-fatal warning attached to a single rule. The rule is skipped,
/// evaluation of every other rule continues.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("Rule '{rule_name}' ({rule_id}) skipped: {issue}")]
pub struct RuleConfigurationError {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub issue: RuleConfigurationIssue,
}

use crate::error::{AuditAnalyticsError, Result};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditType {
    #[schemars(description = "Cloud spend audit (compute, storage, network costs)")]
    Cloud,

    #[schemars(
        description = "Hospitality audit: monthly revenue, occupancy and operating cost categories of a property"
    )]
    Hospitality,

    #[schemars(description = "General business audit (payroll, rent, headcount)")]
    Business,
}

impl AuditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Hospitality => "hospitality",
            Self::Business => "business",
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six comparison modes a rule condition may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }

    /// Equality is exact: no epsilon is applied to `==` or `!=`.
    #[allow(clippy::float_cmp)]
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::LessOrEqual => value <= threshold,
            Self::Equal => value == threshold,
            Self::NotEqual => value != threshold,
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Self::GreaterThan),
            "<" => Ok(Self::LessThan),
            ">=" => Ok(Self::GreaterOrEqual),
            "<=" => Ok(Self::LessOrEqual),
            "==" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A threshold as stored by the rule store: either a JSON number or a string
/// that is expected to hold one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum Threshold {
    Number(f64),
    Text(String),
}

impl Threshold {
    /// Returns the numeric value, or the raw text when it cannot be parsed.
    pub fn resolve(&self) -> std::result::Result<f64, String> {
        match self {
            Self::Number(n) if n.is_finite() => Ok(*n),
            Self::Number(n) => Err(n.to_string()),
            Self::Text(raw) => crate::utils::parse_number(raw).ok_or_else(|| raw.clone()),
        }
    }
}

impl From<f64> for Threshold {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Threshold {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RuleConditions {
    #[schemars(
        description = "Numeric column the rule inspects (e.g. 'revenue', 'occupancy_rate'). Columns missing from a record compare as 0."
    )]
    pub field: String,

    #[schemars(description = "One of '>', '<', '>=', '<=', '==', '!='")]
    pub operator: String,

    #[schemars(description = "Value to compare against. Strings must contain a number.")]
    pub threshold: Threshold,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Rule {
    pub id: Uuid,

    pub organization_id: Uuid,

    #[schemars(description = "Short human readable rule name, used to title findings")]
    pub name: String,

    #[schemars(description = "Audit type this rule applies to")]
    pub audit_type: AuditType,

    pub conditions: RuleConditions,

    #[schemars(description = "Severity copied onto every finding the rule produces")]
    pub severity: Severity,

    #[serde(default = "default_true")]
    #[schemars(description = "Inactive rules are never evaluated")]
    pub is_active: bool,

    #[serde(default)]
    #[schemars(description = "Optional explanation, used as the finding's recommendation")]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Rule {
    pub fn new(
        organization_id: Uuid,
        name: impl Into<String>,
        audit_type: AuditType,
        conditions: RuleConditions,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            audit_type,
            conditions,
            severity,
            is_active: true,
            description: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn matches_audit_type(&self, audit_type: AuditType) -> bool {
        self.audit_type == audit_type
    }

    pub fn activate(&mut self) {
        self.is_active = true;
        self.updated_at = Some(Utc::now());
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Some(Utc::now());
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Rule)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub audit_type: AuditType,
    pub file_name: String,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub total_cost_or_revenue: Option<f64>,
    #[serde(default)]
    pub optimization_score: Option<u32>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Audit {
    pub fn new(organization_id: Uuid, audit_type: AuditType, file_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            audit_type,
            file_name: file_name.into(),
            status: AuditStatus::Pending,
            created_at: Utc::now(),
            total_cost_or_revenue: None,
            optimization_score: None,
            error_message: None,
            completed_at: None,
        }
    }

    /// Moves the audit into `Processing`. Re-running a completed or failed
    /// audit is allowed; an audit already in `Processing` is not.
    pub fn begin_processing(&mut self) -> Result<()> {
        if self.status == AuditStatus::Processing {
            return Err(self.transition_error(AuditStatus::Processing));
        }
        self.status = AuditStatus::Processing;
        self.error_message = None;
        self.completed_at = None;
        Ok(())
    }

    pub fn mark_completed(&mut self, score: u32, cost_or_revenue: f64) -> Result<()> {
        if self.status != AuditStatus::Processing {
            return Err(self.transition_error(AuditStatus::Completed));
        }
        if score > 100 {
            return Err(AuditAnalyticsError::InvalidScore(score));
        }
        self.status = AuditStatus::Completed;
        self.optimization_score = Some(score);
        self.total_cost_or_revenue = Some(cost_or_revenue);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = AuditStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    fn transition_error(&self, to: AuditStatus) -> AuditAnalyticsError {
        AuditAnalyticsError::InvalidStatusTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

/// A single rule match. Findings are never mutated once stored; re-running an
/// audit replaces the whole set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub id: Uuid,
    pub audit_id: Uuid,
    #[serde(default)]
    pub rule_id: Option<Uuid>,
    pub title: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cost_impact: Option<f64>,
    /// Every numeric field of the matched record.
    #[serde(default)]
    pub evidence: BTreeMap<String, f64>,
    #[serde(default)]
    pub recommendation: Option<String>,
    /// Position of the matched record in the normalized input.
    #[serde(default)]
    pub record_index: Option<usize>,
    #[serde(default)]
    pub period_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Finding {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    pub fn has_significant_impact(&self, threshold: f64) -> bool {
        self.cost_impact
            .map(|impact| impact.abs() >= threshold)
            .unwrap_or(false)
    }
}

//! # Audit Analytics
//!
//! A library for evaluating threshold rules against an audit's uploaded
//! record set and deriving period analytics for dashboards.
//!
//! ## Core Concepts
//!
//! - **Raw Rows**: Free-form uploaded rows (CSV cells or JSON values), possibly blank or malformed
//! - **Period Records**: Normalized rows where every tracked numeric field is present and finite
//! - **Rules**: Stored `field operator threshold` conditions with a severity, scoped to an organization and audit type
//! - **Findings**: One per rule/record match, carrying the record's fields as evidence
//! - **Analytics**: Per-period revenue/expenses/profit, totals, margin, best/worst period and expense breakdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use audit_analytics::*;
//! use uuid::Uuid;
//!
//! let csv = "month,revenue,expenses\nJan,1000,600\nFeb,800,900\n";
//! let rows = read_csv_rows(csv.as_bytes()).unwrap();
//!
//! let rule = Rule::new(
//!     Uuid::new_v4(),
//!     "Low revenue",
//!     AuditType::Hospitality,
//!     RuleConditions {
//!         field: "revenue".to_string(),
//!         operator: "<".to_string(),
//!         threshold: Threshold::Number(900.0),
//!     },
//!     Severity::High,
//! );
//!
//! let analysis = analyze_audit(
//!     Uuid::new_v4(),
//!     AuditType::Hospitality,
//!     &rows,
//!     &[rule],
//!     &EngineConfig::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(analysis.report.findings.len(), 1);
//! assert_eq!(analysis.analytics.totals.margin_pct, 16.7);
//! ```

pub mod analytics;
pub mod config;
pub mod engine;
pub mod error;
pub mod field_catalog;
pub mod ingestion;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod scoring;
pub mod store;
pub mod utils;

pub use analytics::{
    compute_analytics, expense_breakdown_from_first_period, AnalyticsResult,
    ExpenseCategoryAmount, PeriodChange, PeriodSummary, Totals,
};
pub use config::EngineConfig;
pub use engine::{evaluate_rules, CompiledRule, EvaluationReport, RuleEvaluator};
pub use error::{AuditAnalyticsError, Result, RuleConfigurationError, RuleConfigurationIssue};
pub use field_catalog::{FieldCatalog, FieldEntry};
pub use ingestion::{normalize_rows, read_csv_rows, PeriodRecord, RawRow, RecordNormalizer};
pub use metrics::{compute_dashboard_metrics, DashboardMetrics};
pub use pipeline::{AuditProcessor, EvaluationLease, EvaluationLocks, ProcessingOutcome};
pub use schema::*;
pub use scoring::{optimization_score, recommendation_for, total_cost_impact};
pub use store::{AuditStore, FindingStore, InMemoryStore, RuleStore};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::Read;
use uuid::Uuid;

/// Everything derived from one audit's rows in a single batch pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditAnalysis {
    pub records: Vec<PeriodRecord>,
    pub report: EvaluationReport,
    pub analytics: AnalyticsResult,
    pub optimization_score: u32,
    pub total_cost_impact: f64,
}

pub struct AuditAnalyzer;

impl AuditAnalyzer {
    /// Normalizes the rows, evaluates the rules and computes analytics without
    /// touching any store.
    pub fn analyze(
        audit_id: Uuid,
        audit_type: AuditType,
        rows: &[RawRow],
        rules: &[Rule],
        config: &EngineConfig,
    ) -> Result<AuditAnalysis> {
        info!(
            "Analyzing {} audit {} with {} rules",
            audit_type,
            audit_id,
            rules.len()
        );

        let normalizer = RecordNormalizer::from_config(config, audit_type);
        let records = normalizer.normalize(rows)?;

        let scoped: Vec<Rule> = rules
            .iter()
            .filter(|r| r.matches_audit_type(audit_type))
            .cloned()
            .collect();
        if scoped.len() != rules.len() {
            debug!(
                "Ignoring {} rules for other audit types",
                rules.len() - scoped.len()
            );
        }

        let report = evaluate_rules(audit_id, &records, &scoped);
        let analytics = compute_analytics(&records);

        Ok(AuditAnalysis {
            optimization_score: optimization_score(&report.findings),
            total_cost_impact: total_cost_impact(&report.findings),
            records,
            report,
            analytics,
        })
    }

    pub fn analyze_csv<R: Read>(
        audit_id: Uuid,
        audit_type: AuditType,
        reader: R,
        rules: &[Rule],
        config: &EngineConfig,
    ) -> Result<AuditAnalysis> {
        let rows = read_csv_rows(reader)?;
        Self::analyze(audit_id, audit_type, &rows, rules, config)
    }
}

pub fn analyze_audit(
    audit_id: Uuid,
    audit_type: AuditType,
    rows: &[RawRow],
    rules: &[Rule],
    config: &EngineConfig,
) -> Result<AuditAnalysis> {
    AuditAnalyzer::analyze(audit_id, audit_type, rows, rules, config)
}

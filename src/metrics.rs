use crate::error::Result;
use crate::schema::{Audit, AuditStatus, Rule};
use crate::store::{AuditStore, FindingStore, RuleStore};
use crate::utils::round_to;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Organization-wide dashboard counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_audits: usize,
    pub completed_audits: usize,
    pub total_findings: usize,
    /// Mean over audits that have a score, one decimal. `None` when no audit
    /// has been scored.
    pub avg_optimization_score: Option<f64>,
    pub active_rules: usize,
}

impl DashboardMetrics {
    pub fn from_parts(audits: &[Audit], total_findings: usize, rules: &[Rule]) -> Self {
        let completed_audits = audits
            .iter()
            .filter(|a| a.status == AuditStatus::Completed)
            .count();

        let scores: Vec<f64> = audits
            .iter()
            .filter_map(|a| a.optimization_score)
            .map(f64::from)
            .collect();
        let avg_optimization_score = if scores.is_empty() {
            None
        } else {
            Some(round_to(scores.iter().sum::<f64>() / scores.len() as f64, 1))
        };

        Self {
            total_audits: audits.len(),
            completed_audits,
            total_findings,
            avg_optimization_score,
            active_rules: rules.iter().filter(|r| r.is_active).count(),
        }
    }
}

pub fn compute_dashboard_metrics<S>(store: &S, organization_id: Uuid) -> Result<DashboardMetrics>
where
    S: AuditStore + FindingStore + RuleStore,
{
    let audits = store.audits_for_organization(organization_id)?;

    let mut total_findings = 0;
    for audit in &audits {
        total_findings += store.count_findings(audit.id)?;
    }

    let rules = store.rules_for_organization(organization_id)?;
    let metrics = DashboardMetrics::from_parts(&audits, total_findings, &rules);

    debug!("Dashboard metrics for {}: {:?}", organization_id, metrics);
    Ok(metrics)
}

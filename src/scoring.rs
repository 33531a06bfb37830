use crate::schema::{Finding, Severity};

pub const PERFECT_SCORE: u32 = 100;
const MAX_PENALTY: u32 = 100;

pub fn severity_weight(severity: Severity) -> u32 {
    match severity {
        Severity::Low => 1,
        Severity::Medium => 3,
        Severity::High => 7,
        Severity::Critical => 15,
    }
}

pub fn recommendation_for(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Immediate action required to address this issue.",
        Severity::High => "High priority - should be addressed soon.",
        Severity::Medium => "Review and plan remediation.",
        Severity::Low => "Monitor and address when convenient.",
    }
}

/// 0-100 health score for an audit. 100 means no findings; each finding
/// subtracts its severity weight, and the total penalty is capped at 100.
pub fn optimization_score(findings: &[Finding]) -> u32 {
    let penalty: u32 = findings
        .iter()
        .map(|f| severity_weight(f.severity))
        .fold(0u32, |acc, w| acc.saturating_add(w));

    PERFECT_SCORE - penalty.min(MAX_PENALTY)
}

/// Sum of the findings' cost impacts, ignoring findings without one.
pub fn total_cost_impact(findings: &[Finding]) -> f64 {
    findings.iter().filter_map(|f| f.cost_impact).sum()
}

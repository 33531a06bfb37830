use crate::error::{RuleConfigurationError, RuleConfigurationIssue};
use crate::field_catalog::COST;
use crate::ingestion::PeriodRecord;
use crate::schema::{ComparisonOperator, Finding, Rule};
use crate::scoring::recommendation_for;
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rule whose operator and threshold have been resolved to typed values.
#[derive(Debug, Clone)]
pub struct CompiledRule<'a> {
    pub rule: &'a Rule,
    pub operator: ComparisonOperator,
    pub threshold: f64,
}

impl<'a> CompiledRule<'a> {
    pub fn compile(rule: &'a Rule) -> Result<Self, RuleConfigurationError> {
        let reject = |issue: RuleConfigurationIssue| RuleConfigurationError {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            issue,
        };

        if rule.conditions.field.trim().is_empty() {
            return Err(reject(RuleConfigurationIssue::EmptyField));
        }

        let operator = rule
            .conditions
            .operator
            .parse::<ComparisonOperator>()
            .map_err(|raw| reject(RuleConfigurationIssue::UnknownOperator(raw)))?;

        let threshold = rule
            .conditions
            .threshold
            .resolve()
            .map_err(|raw| reject(RuleConfigurationIssue::NonNumericThreshold(raw)))?;

        Ok(Self {
            rule,
            operator,
            threshold,
        })
    }

    pub fn field(&self) -> &str {
        self.rule.conditions.field.trim()
    }

    /// Returns the compared value when the record matches.
    pub fn matches(&self, record: &PeriodRecord) -> Option<f64> {
        let value = record.value(self.field());
        self.operator.compare(value, self.threshold).then_some(value)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub findings: Vec<Finding>,
    /// Rules skipped because their condition could not be compiled.
    pub warnings: Vec<RuleConfigurationError>,
    pub inactive_rules_skipped: usize,
}

pub struct RuleEvaluator {
    audit_id: Uuid,
}

impl RuleEvaluator {
    pub fn new(audit_id: Uuid) -> Self {
        Self { audit_id }
    }

    /// Evaluates every active rule against every record.
    ///
    /// Findings are ordered record-major: for each record in input order, each
    /// rule in creation order. Rules sharing a creation time keep their input
    /// order. The evaluator never deletes anything; replacing an audit's prior
    /// findings is the caller's job.
    pub fn evaluate(&self, records: &[PeriodRecord], rules: &[Rule]) -> EvaluationReport {
        let mut ordered: Vec<&Rule> = rules.iter().collect();
        ordered.sort_by_key(|r| r.created_at);

        let mut report = EvaluationReport::default();
        let mut compiled = Vec::with_capacity(ordered.len());

        for rule in ordered {
            if !rule.is_active {
                report.inactive_rules_skipped += 1;
                continue;
            }
            match CompiledRule::compile(rule) {
                Ok(c) => compiled.push(c),
                Err(e) => {
                    warn!("{}", e);
                    report.warnings.push(e);
                }
            }
        }

        for (index, record) in records.iter().enumerate() {
            for rule in &compiled {
                if let Some(value) = rule.matches(record) {
                    debug!(
                        "Rule '{}' matched period {} ({} = {} {} {})",
                        rule.rule.name,
                        record.period_label,
                        rule.field(),
                        value,
                        rule.operator,
                        rule.threshold
                    );
                    report
                        .findings
                        .push(self.build_finding(rule, index, record, value));
                }
            }
        }

        info!(
            "Audit {}: evaluated {} rules over {} records, {} findings, {} misconfigured rules",
            self.audit_id,
            compiled.len(),
            records.len(),
            report.findings.len(),
            report.warnings.len()
        );

        report
    }

    fn build_finding(
        &self,
        compiled: &CompiledRule<'_>,
        index: usize,
        record: &PeriodRecord,
        value: f64,
    ) -> Finding {
        let rule = compiled.rule;
        let summary = rule
            .description
            .clone()
            .unwrap_or_else(|| format!("Rule {} was triggered", rule.name));

        Finding {
            id: Uuid::new_v4(),
            audit_id: self.audit_id,
            rule_id: Some(rule.id),
            title: format!("{} violation", rule.name),
            severity: rule.severity,
            description: Some(format!(
                "{} ({} = {} {} {})",
                summary,
                compiled.field(),
                value,
                compiled.operator,
                compiled.threshold
            )),
            cost_impact: record
                .numeric_fields
                .get(COST)
                .copied()
                .filter(|cost| *cost != 0.0),
            evidence: record.numeric_fields.clone(),
            recommendation: Some(
                rule.description
                    .clone()
                    .unwrap_or_else(|| recommendation_for(rule.severity).to_string()),
            ),
            record_index: Some(index),
            period_label: Some(record.period_label.clone()),
            created_at: Utc::now(),
        }
    }
}

pub fn evaluate_rules(audit_id: Uuid, records: &[PeriodRecord], rules: &[Rule]) -> EvaluationReport {
    RuleEvaluator::new(audit_id).evaluate(records, rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AuditType, RuleConditions, Severity, Threshold};
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn record(label: &str, fields: &[(&str, f64)]) -> PeriodRecord {
        PeriodRecord {
            period_label: label.to_string(),
            numeric_fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn rule(name: &str, field: &str, operator: &str, threshold: Threshold, minute: i64) -> Rule {
        let mut rule = Rule::new(
            Uuid::nil(),
            name,
            AuditType::Hospitality,
            RuleConditions {
                field: field.to_string(),
                operator: operator.to_string(),
                threshold,
            },
            Severity::Medium,
        );
        rule.created_at =
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
        rule
    }

    fn two_months() -> Vec<PeriodRecord> {
        vec![
            record("Jan", &[("revenue", 1000.0), ("expenses", 600.0)]),
            record("Feb", &[("revenue", 800.0), ("expenses", 900.0)]),
        ]
    }

    #[test]
    fn test_single_rule_matches_one_period() {
        let rules = vec![rule("Low revenue", "revenue", "<", 900.0.into(), 0)];
        let report = evaluate_rules(Uuid::new_v4(), &two_months(), &rules);

        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.period_label.as_deref(), Some("Feb"));
        assert_eq!(finding.record_index, Some(1));
        assert_eq!(finding.title, "Low revenue violation");
        assert_eq!(finding.rule_id, Some(rules[0].id));
        assert_eq!(finding.evidence.get("revenue"), Some(&800.0));
        assert_eq!(finding.evidence.get("expenses"), Some(&900.0));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_inactive_rules_never_emit() {
        let mut inactive = rule("Any revenue", "revenue", ">=", 0.0.into(), 0);
        inactive.is_active = false;
        let rules = vec![inactive];

        let report = evaluate_rules(Uuid::new_v4(), &two_months(), &rules);
        assert!(report.findings.is_empty());
        assert_eq!(report.inactive_rules_skipped, 1);
    }

    #[test]
    fn test_unknown_field_compares_against_zero() {
        let rules = vec![
            rule("Ghost positive", "does_not_exist", ">", 0.0.into(), 0),
            rule("Ghost zero", "does_not_exist", "==", 0.0.into(), 1),
        ];
        let report = evaluate_rules(Uuid::new_v4(), &two_months(), &rules);

        assert_eq!(report.findings.len(), 2);
        assert!(report
            .findings
            .iter()
            .all(|f| f.title == "Ghost zero violation"));
    }

    #[test]
    fn test_misconfigured_rule_is_skipped_with_warning() {
        let rules = vec![
            rule("Low revenue", "revenue", "<", 900.0.into(), 0),
            rule("Broken", "revenue", ">", Threshold::from("abc"), 1),
            rule("Overspend", "expenses", ">", Threshold::from("850"), 2),
        ];
        let report = evaluate_rules(Uuid::new_v4(), &two_months(), &rules);

        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].rule_id, rules[1].id);
        assert_eq!(
            report.warnings[0].issue,
            RuleConfigurationIssue::NonNumericThreshold("abc".to_string())
        );
    }

    #[test]
    fn test_unknown_operator_and_empty_field() {
        let rules = vec![
            rule("Approx", "revenue", "~=", 800.0.into(), 0),
            rule("Blank", " ", ">", 1.0.into(), 1),
        ];
        let report = evaluate_rules(Uuid::new_v4(), &two_months(), &rules);

        assert!(report.findings.is_empty());
        let issues: Vec<_> = report.warnings.iter().map(|w| w.issue.clone()).collect();
        assert_eq!(
            issues,
            vec![
                RuleConfigurationIssue::UnknownOperator("~=".to_string()),
                RuleConfigurationIssue::EmptyField
            ]
        );
    }

    #[test]
    fn test_findings_are_record_major_in_rule_creation_order() {
        let rules = vec![
            rule("Second", "revenue", ">", 0.0.into(), 5),
            rule("First", "expenses", ">", 0.0.into(), 1),
        ];
        let report = evaluate_rules(Uuid::new_v4(), &two_months(), &rules);

        let order: Vec<(usize, &str)> = report
            .findings
            .iter()
            .map(|f| (f.record_index.unwrap(), f.title.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "First violation"),
                (0, "Second violation"),
                (1, "First violation"),
                (1, "Second violation"),
            ]
        );
    }

    #[test]
    fn test_reevaluation_is_idempotent() {
        let rules = vec![
            rule("Low revenue", "revenue", "<", 900.0.into(), 0),
            rule("Overspend", "expenses", ">=", 600.0.into(), 1),
        ];
        let audit_id = Uuid::new_v4();
        let records = two_months();

        let triples = |report: EvaluationReport| -> Vec<(Option<Uuid>, Option<usize>, Severity)> {
            report
                .findings
                .into_iter()
                .map(|f| (f.rule_id, f.record_index, f.severity))
                .collect()
        };

        let first = triples(evaluate_rules(audit_id, &records, &rules));
        let second = triples(evaluate_rules(audit_id, &records, &rules));
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_recommendation_and_cost_impact() {
        let mut described = rule("Cloud overspend", "cost", ">", 100.0.into(), 0);
        described.description = Some("Right-size idle instances".to_string());
        let mut bare = rule("CPU idle", "cpu_utilization", "<", 10.0.into(), 1);
        bare.severity = Severity::Critical;

        let records = vec![record("Jan", &[("cost", 450.0), ("cpu_utilization", 3.0)])];
        let report = evaluate_rules(Uuid::new_v4(), &records, &[described, bare]);

        assert_eq!(report.findings.len(), 2);
        assert_eq!(
            report.findings[0].recommendation.as_deref(),
            Some("Right-size idle instances")
        );
        assert_eq!(report.findings[0].cost_impact, Some(450.0));
        assert_eq!(
            report.findings[1].recommendation.as_deref(),
            Some("Immediate action required to address this issue.")
        );
        assert_eq!(report.findings[1].severity, Severity::Critical);
        assert!(report.findings[1]
            .description
            .as_deref()
            .unwrap()
            .starts_with("Rule CPU idle was triggered"));
    }

    #[test]
    fn test_no_cost_column_means_no_cost_impact() {
        let rules = vec![rule("Low revenue", "revenue", "<", 900.0.into(), 0)];
        let report = evaluate_rules(Uuid::new_v4(), &two_months(), &rules);
        assert_eq!(report.findings[0].cost_impact, None);
    }

    #[test]
    fn test_defaulted_cost_carries_no_cost_impact() {
        // cost is tracked for this audit type but the period never had one
        let records = vec![record("Q1", &[("cost", 0.0), ("expenses", 500.0)])];
        let rules = vec![rule("Expense ceiling", "expenses", ">=", 500.0.into(), 0)];
        let report = evaluate_rules(Uuid::new_v4(), &records, &rules);

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].cost_impact, None);
        assert_eq!(report.findings[0].evidence.get("cost"), Some(&0.0));
    }
}

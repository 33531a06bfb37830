//! Persistence ports for audits, rules and findings, plus an in-memory
//! implementation used by tests and embedders without a database.

use crate::error::{AuditAnalyticsError, Result};
use crate::schema::{Audit, AuditType, Finding, Rule};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

pub trait AuditStore {
    fn get_audit(&self, audit_id: Uuid) -> Result<Option<Audit>>;

    fn audits_for_organization(&self, organization_id: Uuid) -> Result<Vec<Audit>>;

    fn update_audit(&self, audit: &Audit) -> Result<()>;
}

pub trait RuleStore {
    fn rules_for_organization(&self, organization_id: Uuid) -> Result<Vec<Rule>>;

    /// Active rules of one organization and audit type, in creation order.
    fn active_rules(&self, organization_id: Uuid, audit_type: AuditType) -> Result<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .rules_for_organization(organization_id)?
            .into_iter()
            .filter(|r| r.is_active && r.matches_audit_type(audit_type))
            .collect();
        rules.sort_by_key(|r| r.created_at);
        Ok(rules)
    }
}

pub trait FindingStore {
    fn findings_for_audit(&self, audit_id: Uuid) -> Result<Vec<Finding>>;

    fn count_findings(&self, audit_id: Uuid) -> Result<usize> {
        Ok(self.findings_for_audit(audit_id)?.len())
    }

    /// Deletes every finding of the audit, returning how many were removed.
    fn delete_findings_for_audit(&self, audit_id: Uuid) -> Result<usize>;

    /// Atomically swaps the audit's findings for a new set. Returns how many
    /// findings were discarded.
    fn replace_findings(&self, audit_id: Uuid, findings: Vec<Finding>) -> Result<usize>;
}

#[derive(Default)]
pub struct InMemoryStore {
    audits: RwLock<HashMap<Uuid, Audit>>,
    rules: RwLock<Vec<Rule>>,
    findings: RwLock<HashMap<Uuid, Vec<Finding>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_audit(&self, audit: Audit) -> Result<()> {
        write(&self.audits)?.insert(audit.id, audit);
        Ok(())
    }

    pub fn insert_rule(&self, rule: Rule) -> Result<()> {
        write(&self.rules)?.push(rule);
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| AuditAnalyticsError::Store(format!("lock poisoned: {}", e)))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| AuditAnalyticsError::Store(format!("lock poisoned: {}", e)))
}

impl AuditStore for InMemoryStore {
    fn get_audit(&self, audit_id: Uuid) -> Result<Option<Audit>> {
        Ok(read(&self.audits)?.get(&audit_id).cloned())
    }

    fn audits_for_organization(&self, organization_id: Uuid) -> Result<Vec<Audit>> {
        let mut audits: Vec<Audit> = read(&self.audits)?
            .values()
            .filter(|a| a.organization_id == organization_id)
            .cloned()
            .collect();
        audits.sort_by_key(|a| a.created_at);
        Ok(audits)
    }

    fn update_audit(&self, audit: &Audit) -> Result<()> {
        let mut audits = write(&self.audits)?;
        match audits.get_mut(&audit.id) {
            Some(existing) => {
                *existing = audit.clone();
                Ok(())
            }
            None => Err(AuditAnalyticsError::AuditNotFound(audit.id)),
        }
    }
}

impl RuleStore for InMemoryStore {
    fn rules_for_organization(&self, organization_id: Uuid) -> Result<Vec<Rule>> {
        Ok(read(&self.rules)?
            .iter()
            .filter(|r| r.organization_id == organization_id)
            .cloned()
            .collect())
    }
}

impl FindingStore for InMemoryStore {
    fn findings_for_audit(&self, audit_id: Uuid) -> Result<Vec<Finding>> {
        Ok(read(&self.findings)?
            .get(&audit_id)
            .cloned()
            .unwrap_or_default())
    }

    fn delete_findings_for_audit(&self, audit_id: Uuid) -> Result<usize> {
        Ok(write(&self.findings)?
            .remove(&audit_id)
            .map(|f| f.len())
            .unwrap_or(0))
    }

    fn replace_findings(&self, audit_id: Uuid, findings: Vec<Finding>) -> Result<usize> {
        let mut all = write(&self.findings)?;
        let previous = all.insert(audit_id, findings);
        Ok(previous.map(|f| f.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RuleConditions, Severity};
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn rule(org: Uuid, audit_type: AuditType, active: bool, age_minutes: i64) -> Rule {
        let mut rule = Rule::new(
            org,
            format!("rule-{}", age_minutes),
            audit_type,
            RuleConditions {
                field: "revenue".to_string(),
                operator: ">".to_string(),
                threshold: 0.0.into(),
            },
            Severity::Low,
        );
        rule.is_active = active;
        rule.created_at = Utc::now() - Duration::minutes(age_minutes);
        rule
    }

    fn finding(audit_id: Uuid) -> Finding {
        Finding {
            id: Uuid::new_v4(),
            audit_id,
            rule_id: None,
            title: "t".to_string(),
            severity: Severity::Low,
            description: None,
            cost_impact: None,
            evidence: BTreeMap::new(),
            recommendation: None,
            record_index: None,
            period_label: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_rules_are_scoped_and_ordered() {
        let store = InMemoryStore::new();
        let org = Uuid::new_v4();

        store.insert_rule(rule(org, AuditType::Cloud, true, 1)).unwrap();
        store.insert_rule(rule(org, AuditType::Cloud, true, 10)).unwrap();
        store.insert_rule(rule(org, AuditType::Cloud, false, 5)).unwrap();
        store.insert_rule(rule(org, AuditType::Business, true, 3)).unwrap();
        store
            .insert_rule(rule(Uuid::new_v4(), AuditType::Cloud, true, 2))
            .unwrap();

        let names: Vec<String> = store
            .active_rules(org, AuditType::Cloud)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["rule-10", "rule-1"]);
    }

    #[test]
    fn test_replace_findings_discards_previous_set() {
        let store = InMemoryStore::new();
        let audit_id = Uuid::new_v4();

        assert_eq!(
            store
                .replace_findings(audit_id, vec![finding(audit_id), finding(audit_id)])
                .unwrap(),
            0
        );
        assert_eq!(
            store.replace_findings(audit_id, vec![finding(audit_id)]).unwrap(),
            2
        );
        assert_eq!(store.count_findings(audit_id).unwrap(), 1);
        assert_eq!(store.delete_findings_for_audit(audit_id).unwrap(), 1);
        assert!(store.findings_for_audit(audit_id).unwrap().is_empty());
    }

    #[test]
    fn test_update_unknown_audit_fails() {
        let store = InMemoryStore::new();
        let audit = Audit::new(Uuid::new_v4(), AuditType::Cloud, "x.csv");
        assert!(matches!(
            store.update_audit(&audit),
            Err(AuditAnalyticsError::AuditNotFound(_))
        ));
    }
}

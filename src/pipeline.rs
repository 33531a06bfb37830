use crate::analytics::{compute_analytics, AnalyticsResult};
use crate::config::EngineConfig;
use crate::engine::RuleEvaluator;
use crate::error::{AuditAnalyticsError, Result, RuleConfigurationError};
use crate::ingestion::{RawRow, RecordNormalizer};
use crate::schema::{Audit, Finding};
use crate::scoring::{optimization_score, total_cost_impact};
use crate::store::{AuditStore, FindingStore, RuleStore};
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

/// Tracks which audits are currently being evaluated. At most one lease per
/// audit exists at any time.
#[derive(Default)]
pub struct EvaluationLocks {
    active: Mutex<HashSet<Uuid>>,
}

impl EvaluationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `ConcurrencyViolation` instead of waiting when the audit is
    /// already held.
    pub fn try_acquire(&self, audit_id: Uuid) -> Result<EvaluationLease<'_>> {
        let mut active = self
            .active
            .lock()
            .map_err(|e| AuditAnalyticsError::Store(format!("lock poisoned: {}", e)))?;

        if !active.insert(audit_id) {
            return Err(AuditAnalyticsError::ConcurrencyViolation(audit_id));
        }

        Ok(EvaluationLease {
            locks: self,
            audit_id,
        })
    }

    pub fn is_held(&self, audit_id: Uuid) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(&audit_id))
            .unwrap_or(false)
    }
}

/// Released on drop.
pub struct EvaluationLease<'a> {
    locks: &'a EvaluationLocks,
    audit_id: Uuid,
}

impl Drop for EvaluationLease<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.locks.active.lock() {
            active.remove(&self.audit_id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub audit: Audit,
    pub findings: Vec<Finding>,
    pub warnings: Vec<RuleConfigurationError>,
    pub replaced_findings: usize,
    pub analytics: AnalyticsResult,
}

/// Runs evaluation passes against a store. Processors that share a store
/// must share one `EvaluationLocks` so an audit is evaluated by at most one
/// caller at a time.
pub struct AuditProcessor<'a, S> {
    store: &'a S,
    locks: &'a EvaluationLocks,
    config: EngineConfig,
}

impl<'a, S> AuditProcessor<'a, S>
where
    S: AuditStore + RuleStore + FindingStore,
{
    pub fn new(store: &'a S, locks: &'a EvaluationLocks, config: EngineConfig) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    pub fn locks(&self) -> &EvaluationLocks {
        self.locks
    }

    /// Runs one full evaluation pass for an audit: normalize the uploaded
    /// rows, evaluate the organization's active rules for the audit type,
    /// replace the audit's findings and record score and cost impact.
    ///
    /// Any failure after the audit entered `Processing` marks it failed and
    /// returns that failure.
    pub fn process(&self, audit_id: Uuid, rows: &[RawRow]) -> Result<ProcessingOutcome> {
        let _lease = self.locks.try_acquire(audit_id)?;

        let mut audit = self
            .store
            .get_audit(audit_id)?
            .ok_or(AuditAnalyticsError::AuditNotFound(audit_id))?;

        audit.begin_processing()?;
        self.store.update_audit(&audit)?;
        info!(
            "Processing {} audit {} ({} rows)",
            audit.audit_type,
            audit.id,
            rows.len()
        );

        match self.complete(&audit, rows) {
            Ok(outcome) => {
                info!(
                    "Audit {} completed: {} findings, score {}",
                    audit.id,
                    outcome.findings.len(),
                    outcome.audit.optimization_score.unwrap_or_default()
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!("Audit {} failed: {}", audit.id, e);
                audit.mark_failed(e.to_string());
                if let Err(store_err) = self.store.update_audit(&audit) {
                    error!(
                        "Audit {}: could not record failure status: {}",
                        audit.id, store_err
                    );
                }
                Err(e)
            }
        }
    }

    fn complete(&self, audit: &Audit, rows: &[RawRow]) -> Result<ProcessingOutcome> {
        let mut outcome = self.evaluate_and_store(audit, rows)?;

        let mut completed = audit.clone();
        completed.mark_completed(
            optimization_score(&outcome.findings),
            total_cost_impact(&outcome.findings),
        )?;
        self.store.update_audit(&completed)?;

        outcome.audit = completed;
        Ok(outcome)
    }

    fn evaluate_and_store(&self, audit: &Audit, rows: &[RawRow]) -> Result<ProcessingOutcome> {
        let normalizer = RecordNormalizer::from_config(&self.config, audit.audit_type);
        let records = normalizer.normalize(rows)?;

        let rules = self
            .store
            .active_rules(audit.organization_id, audit.audit_type)?;

        let report = RuleEvaluator::new(audit.id).evaluate(&records, &rules);
        let replaced_findings = self
            .store
            .replace_findings(audit.id, report.findings.clone())?;

        Ok(ProcessingOutcome {
            audit: audit.clone(),
            findings: report.findings,
            warnings: report.warnings,
            replaced_findings,
            analytics: compute_analytics(&records),
        })
    }
}

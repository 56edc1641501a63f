use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::workflows::jobs::domain::JobId;
use crate::workflows::jobs::repository::{JobRepository, RepositoryError};

use super::domain::{
    round_cents, Formula, LineItem, PricebookVersion, PricingRule, QuotePricing, RuleCategory,
    RuleId, VersionId,
};
use super::engine::{self, EvaluationError};
use super::repository::{AuditAction, AuditEntry, AuditSink, PricebookRepository};

static VERSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static RULE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

const DEFAULT_ACTOR: &str = "admin";

fn next_version_id() -> VersionId {
    let id = VERSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    VersionId(format!("pbv-{id:06}"))
}

fn next_rule_id() -> RuleId {
    let id = RULE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RuleId(format!("rule-{id:06}"))
}

/// Per-job-id mutual exclusion for SSOT read-modify-writes. The state
/// machine gets by on the store's conditional updates, but an override
/// rewrites a composite document and two concurrent ones would clobber
/// each other's recomputed aggregates.
///
/// Entries are held weakly: a job's slot dies with its last guard, and
/// dead slots are swept on the next acquisition, so the table is bounded
/// by the number of in-flight operations rather than total job churn.
#[derive(Default)]
struct JobLocks {
    locks: Mutex<HashMap<JobId, Weak<Mutex<()>>>>,
}

impl JobLocks {
    fn for_job(&self, id: &JobId) -> Arc<Mutex<()>> {
        let mut guard = self.locks.lock().expect("job lock table poisoned");
        guard.retain(|_, lock| lock.strong_count() > 0);
        if let Some(existing) = guard.get(id).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Arc::new(Mutex::new(()));
        guard.insert(id.clone(), Arc::downgrade(&fresh));
        fresh
    }

    #[cfg(test)]
    fn live_entries(&self) -> usize {
        self.locks.lock().expect("job lock table poisoned").len()
    }
}

/// Payload for creating a pricebook version, optionally branched from an
/// existing one.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVersionRequest {
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub notes: String,
    /// Deep-copies the source version's rules under fresh ids; later edits
    /// to either version never affect the other.
    #[serde(default)]
    pub clone_from: Option<VersionId>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Payload shared by rule create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub category: RuleCategory,
    pub formula: Formula,
    #[serde(default)]
    pub applies_to: BTreeMap<String, String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub actor: Option<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverrideRequest {
    pub unit_price: f64,
    pub reason: String,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceJobRequest {
    pub version_id: VersionId,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Error raised by the pricing engine and its admin operations.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("job not found")]
    JobNotFound,
    #[error("pricebook version not found")]
    VersionNotFound,
    #[error("pricing rule not found")]
    RuleNotFound,
    #[error("line item '{0}' not found")]
    LineItemNotFound(String),
    #[error("job has no pricing data")]
    MissingPricing,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("no active pricing rule matches line item '{0}'")]
    NoRuleMatched(String),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Pricing engine: versioned rule administration, quote computation, and
/// transactional manual override with an audit trail.
pub struct PricingService<P, J, A> {
    pricebooks: Arc<P>,
    jobs: Arc<J>,
    audit: Arc<A>,
    overrides: JobLocks,
    version_numbering: Mutex<()>,
}

impl<P, J, A> PricingService<P, J, A>
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    pub fn new(pricebooks: Arc<P>, jobs: Arc<J>, audit: Arc<A>) -> Self {
        Self {
            pricebooks,
            jobs,
            audit,
            overrides: JobLocks::default(),
            version_numbering: Mutex::new(()),
        }
    }

    /// Create a pricebook version, optionally cloning every rule from a
    /// source version as a point-in-time branch.
    pub fn create_version(
        &self,
        request: CreateVersionRequest,
    ) -> Result<PricebookVersion, PricingError> {
        // The version number reads the current maximum before inserting,
        // and the store only guarantees per-record atomicity, so the whole
        // read-then-insert is serialized here.
        let _numbering = self
            .version_numbering
            .lock()
            .expect("version numbering mutex poisoned");

        let rules = match &request.clone_from {
            Some(source_id) => {
                let source = self
                    .pricebooks
                    .fetch_version(source_id)?
                    .ok_or(PricingError::VersionNotFound)?;
                source
                    .rules
                    .iter()
                    .map(|rule| PricingRule {
                        id: next_rule_id(),
                        ..rule.clone()
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        let version_number = self
            .pricebooks
            .list_versions()?
            .iter()
            .map(|version| version.version)
            .max()
            .unwrap_or(0)
            + 1;

        let version = PricebookVersion {
            id: next_version_id(),
            version: version_number,
            effective_date: request.effective_date,
            notes: request.notes,
            rules,
            created_at: Utc::now(),
        };
        let stored = self.pricebooks.insert_version(version)?;

        self.record_audit(AuditEntry {
            job_id: None,
            actor: request.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
            action: AuditAction::VersionCreated,
            diff: json!({
                "version_id": stored.id.0,
                "version": stored.version,
                "cloned_from": request.clone_from.as_ref().map(|id| id.0.clone()),
                "rule_count": stored.rules.len(),
            }),
            recorded_at: Utc::now(),
        });
        Ok(stored)
    }

    pub fn list_versions(&self) -> Result<Vec<PricebookVersion>, PricingError> {
        Ok(self.pricebooks.list_versions()?)
    }

    pub fn list_rules(&self, version_id: &VersionId) -> Result<Vec<PricingRule>, PricingError> {
        Ok(self.fetch_version(version_id)?.rules)
    }

    pub fn create_rule(
        &self,
        version_id: &VersionId,
        spec: RuleSpec,
    ) -> Result<PricingRule, PricingError> {
        validate_rule_spec(&spec)?;
        let mut version = self.fetch_version(version_id)?;

        let rule = PricingRule {
            id: next_rule_id(),
            name: spec.name,
            category: spec.category,
            formula: spec.formula,
            applies_to: spec.applies_to,
            is_active: spec.is_active,
        };
        version.rules.push(rule.clone());
        self.pricebooks.update_version(version)?;

        self.record_audit(AuditEntry {
            job_id: None,
            actor: spec.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
            action: AuditAction::RuleCreated,
            diff: json!({ "version_id": version_id.0, "rule_id": rule.id.0, "name": rule.name }),
            recorded_at: Utc::now(),
        });
        Ok(rule)
    }

    pub fn update_rule(
        &self,
        version_id: &VersionId,
        rule_id: &RuleId,
        spec: RuleSpec,
    ) -> Result<PricingRule, PricingError> {
        validate_rule_spec(&spec)?;
        let mut version = self.fetch_version(version_id)?;
        let rule = version
            .rules
            .iter_mut()
            .find(|rule| &rule.id == rule_id)
            .ok_or(PricingError::RuleNotFound)?;

        rule.name = spec.name;
        rule.category = spec.category;
        rule.formula = spec.formula;
        rule.applies_to = spec.applies_to;
        rule.is_active = spec.is_active;
        let updated = rule.clone();
        self.pricebooks.update_version(version)?;

        self.record_audit(AuditEntry {
            job_id: None,
            actor: spec.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
            action: AuditAction::RuleUpdated,
            diff: json!({ "version_id": version_id.0, "rule_id": rule_id.0 }),
            recorded_at: Utc::now(),
        });
        Ok(updated)
    }

    /// Soft delete: historical quotes may reference the rule, so removal
    /// only clears the activity flag.
    pub fn deactivate_rule(
        &self,
        version_id: &VersionId,
        rule_id: &RuleId,
    ) -> Result<PricingRule, PricingError> {
        let mut version = self.fetch_version(version_id)?;
        let rule = version
            .rules
            .iter_mut()
            .find(|rule| &rule.id == rule_id)
            .ok_or(PricingError::RuleNotFound)?;

        rule.is_active = false;
        let updated = rule.clone();
        self.pricebooks.update_version(version)?;

        self.record_audit(AuditEntry {
            job_id: None,
            actor: DEFAULT_ACTOR.to_string(),
            action: AuditAction::RuleDeactivated,
            diff: json!({ "version_id": version_id.0, "rule_id": rule_id.0 }),
            recorded_at: Utc::now(),
        });
        Ok(updated)
    }

    /// Price every line item of the job's SSOT against `version_id`,
    /// recompute the aggregates, and persist the document as one write.
    /// Manually overridden items keep their price across re-runs.
    pub fn price_job(
        &self,
        job_id: &JobId,
        request: PriceJobRequest,
    ) -> Result<QuotePricing, PricingError> {
        let version = self.fetch_version(&request.version_id)?;

        let lock = self.overrides.for_job(job_id);
        let _guard = lock.lock().expect("job lock poisoned");

        let job = self.jobs.fetch(job_id)?.ok_or(PricingError::JobNotFound)?;
        let mut document = job.document;
        let mut pricing = document.pricing.take().ok_or(PricingError::MissingPricing)?;

        for item in &mut pricing.line_items {
            if item.manual_override {
                continue;
            }
            price_line_item(&version.rules, item)?;
        }
        pricing.recompute();

        document.pricing = Some(pricing.clone());
        self.jobs.replace_document(job_id, document)?;

        self.record_audit(AuditEntry {
            job_id: Some(job_id.clone()),
            actor: request.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
            action: AuditAction::QuotePriced,
            diff: json!({
                "version_id": request.version_id.0,
                "line_items": pricing.line_items.len(),
                "total": pricing.total,
            }),
            recorded_at: Utc::now(),
        });
        Ok(pricing)
    }

    /// Manually override one line item's unit price, recomputing its total
    /// and the document aggregates, then persist the whole SSOT as a
    /// single write followed by one audit entry. Serialized per job id.
    pub fn apply_override(
        &self,
        job_id: &JobId,
        item_id: &str,
        request: OverrideRequest,
    ) -> Result<LineItem, PricingError> {
        if request.reason.trim().is_empty() {
            return Err(PricingError::InvalidRequest(
                "override reason is required".to_string(),
            ));
        }
        if !request.unit_price.is_finite() || request.unit_price < 0.0 {
            return Err(PricingError::InvalidRequest(
                "unit price must be a non-negative amount".to_string(),
            ));
        }

        let lock = self.overrides.for_job(job_id);
        let _guard = lock.lock().expect("job lock poisoned");

        let job = self.jobs.fetch(job_id)?.ok_or(PricingError::JobNotFound)?;
        let mut document = job.document;
        let mut pricing = document.pricing.take().ok_or(PricingError::MissingPricing)?;

        let item = pricing
            .line_items
            .iter_mut()
            .find(|item| item.item_id == item_id)
            .ok_or_else(|| PricingError::LineItemNotFound(item_id.to_string()))?;

        item.unit_price = request.unit_price;
        item.total_price = round_cents(request.unit_price * f64::from(item.quantity.max(1)));
        item.manual_override = true;
        item.override_reason = Some(request.reason.clone());
        let updated = item.clone();

        pricing.recompute();
        document.pricing = Some(pricing);
        self.jobs.replace_document(job_id, document)?;

        self.record_audit(AuditEntry {
            job_id: Some(job_id.clone()),
            actor: request.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
            action: AuditAction::PriceOverride,
            diff: json!({
                "item_id": item_id,
                "unit_price": request.unit_price,
                "reason": request.reason,
            }),
            recorded_at: Utc::now(),
        });
        Ok(updated)
    }

    fn fetch_version(&self, id: &VersionId) -> Result<PricebookVersion, PricingError> {
        self.pricebooks
            .fetch_version(id)?
            .ok_or(PricingError::VersionNotFound)
    }

    /// Mutations commit first; a failed audit write is logged, never
    /// rolled back into the primary operation.
    fn record_audit(&self, entry: AuditEntry) {
        if let Err(err) = self.audit.append(entry) {
            error!(error = %err, "audit write failed after committed pricing mutation");
        }
    }
}

fn price_line_item(rules: &[PricingRule], item: &mut LineItem) -> Result<(), PricingError> {
    let attributes = item.match_attributes();
    let rule = engine::resolve_rule(rules, &attributes)
        .ok_or_else(|| PricingError::NoRuleMatched(item.item_id.clone()))?;
    let evaluated = engine::evaluate(&rule.formula, item)?;
    item.unit_price = evaluated.unit_price;
    item.total_price = evaluated.total;
    Ok(())
}

fn validate_rule_spec(spec: &RuleSpec) -> Result<(), PricingError> {
    if spec.name.trim().is_empty() {
        return Err(PricingError::InvalidRequest(
            "rule name is required".to_string(),
        ));
    }
    let parameter = match spec.formula {
        Formula::PerSqft { rate } => rate,
        Formula::UnitPrice { unit_price } => unit_price,
        Formula::Fixed { amount } => amount,
    };
    if !parameter.is_finite() || parameter < 0.0 {
        return Err(PricingError::InvalidRequest(
            "formula amount must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

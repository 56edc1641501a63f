use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};

use crate::workflows::jobs::domain::{JobDocument, JobId, JobRecord, JobStatus};
use crate::workflows::jobs::repository::{JobRepository, RepositoryError, TokenAction};
use crate::workflows::pricing::domain::{
    Formula, LineItem, PricebookVersion, QuotePricing, RuleCategory, VersionId,
};
use crate::workflows::pricing::repository::{
    AuditEntry, AuditError, AuditSink, PricebookRepository,
};
use crate::workflows::pricing::service::{CreateVersionRequest, PricingService, RuleSpec};

#[derive(Default, Clone)]
pub(super) struct MemoryPricebooks {
    versions: Arc<Mutex<HashMap<VersionId, PricebookVersion>>>,
}

impl PricebookRepository for MemoryPricebooks {
    fn insert_version(
        &self,
        version: PricebookVersion,
    ) -> Result<PricebookVersion, RepositoryError> {
        let mut guard = self.versions.lock().expect("pricebook mutex poisoned");
        if guard.contains_key(&version.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(version.id.clone(), version.clone());
        Ok(version)
    }

    fn update_version(&self, version: PricebookVersion) -> Result<(), RepositoryError> {
        let mut guard = self.versions.lock().expect("pricebook mutex poisoned");
        if guard.contains_key(&version.id) {
            guard.insert(version.id.clone(), version);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch_version(&self, id: &VersionId) -> Result<Option<PricebookVersion>, RepositoryError> {
        let guard = self.versions.lock().expect("pricebook mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list_versions(&self) -> Result<Vec<PricebookVersion>, RepositoryError> {
        let guard = self.versions.lock().expect("pricebook mutex poisoned");
        let mut versions: Vec<_> = guard.values().cloned().collect();
        versions.sort_by_key(|version| version.version);
        Ok(versions)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAudit {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAudit {
    pub(super) fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for MemoryAudit {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().expect("audit mutex poisoned").push(entry);
        Ok(())
    }
}

pub(super) struct FailingAudit;

impl AuditSink for FailingAudit {
    fn append(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("audit table offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryJobs {
    records: Arc<Mutex<HashMap<JobId, JobRecord>>>,
}

impl MemoryJobs {
    pub(super) fn seed(&self, record: JobRecord) {
        let mut guard = self.records.lock().expect("job mutex poisoned");
        guard.insert(record.id.clone(), record);
    }

    pub(super) fn get(&self, id: &JobId) -> Option<JobRecord> {
        let guard = self.records.lock().expect("job mutex poisoned");
        guard.get(id).cloned()
    }
}

impl JobRepository for MemoryJobs {
    fn insert(&self, record: JobRecord) -> Result<JobRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("job mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        let guard = self.records.lock().expect("job mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_upload_token(
        &self,
        token: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<JobRecord>, RepositoryError> {
        let guard = self.records.lock().expect("job mutex poisoned");
        Ok(guard
            .values()
            .find(|record| {
                record.upload_token.as_deref() == Some(token)
                    && statuses.contains(&record.status)
            })
            .cloned())
    }

    fn transition(
        &self,
        id: &JobId,
        expected: &[JobStatus],
        to: JobStatus,
        token: TokenAction,
    ) -> Result<JobRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("job mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !expected.contains(&record.status) {
            return Err(RepositoryError::Conflict);
        }
        record.status = to;
        if token == TokenAction::Consume {
            record.upload_token = None;
            record.upload_token_expiry = None;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn replace_document(&self, id: &JobId, document: JobDocument) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("job mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.document = document;
        record.updated_at = Utc::now();
        Ok(())
    }
}

pub(super) type TestService = PricingService<MemoryPricebooks, MemoryJobs, MemoryAudit>;

pub(super) fn service() -> (TestService, MemoryPricebooks, MemoryJobs, MemoryAudit) {
    let pricebooks = MemoryPricebooks::default();
    let jobs = MemoryJobs::default();
    let audit = MemoryAudit::default();
    let service = PricingService::new(
        Arc::new(pricebooks.clone()),
        Arc::new(jobs.clone()),
        Arc::new(audit.clone()),
    );
    (service, pricebooks, jobs, audit)
}

pub(super) fn effective_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date")
}

pub(super) fn version_request() -> CreateVersionRequest {
    CreateVersionRequest {
        effective_date: effective_date(),
        notes: "seasonal refresh".to_string(),
        clone_from: None,
        actor: None,
    }
}

pub(super) fn rule_spec(
    name: &str,
    formula: Formula,
    predicate: &[(&str, &str)],
) -> RuleSpec {
    RuleSpec {
        name: name.to_string(),
        category: RuleCategory::ShowerEnclosure,
        formula,
        applies_to: predicate
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        is_active: true,
        actor: None,
    }
}

pub(super) fn line_item(item_id: &str, quantity: u32, unit_price: f64) -> LineItem {
    LineItem {
        item_id: item_id.to_string(),
        category: RuleCategory::ShowerEnclosure,
        quantity,
        attributes: BTreeMap::new(),
        area_sqft: None,
        unit_price,
        total_price: unit_price * f64::from(quantity),
        manual_override: false,
        override_reason: None,
    }
}

/// A job sitting past measurement with a priced SSOT attached.
pub(super) fn priced_job(id: &str, items: Vec<LineItem>, tax: f64) -> JobRecord {
    let mut pricing = QuotePricing {
        line_items: items,
        subtotal: 0.0,
        tax,
        total: 0.0,
    };
    pricing.recompute();

    let now = Utc::now();
    JobRecord {
        id: JobId(id.to_string()),
        status: JobStatus::Pricing,
        upload_token: None,
        upload_token_expiry: None,
        stage_progress: serde_json::Value::Null,
        error_code: None,
        error_message: None,
        document: JobDocument {
            measurement: None,
            pricing: Some(pricing),
        },
        created_at: now,
        updated_at: now,
    }
}

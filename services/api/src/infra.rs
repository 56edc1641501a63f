use chrono::Utc;
use glassline::workflows::jobs::{
    JobDocument, JobId, JobRecord, JobRepository, JobStatus, ObjectRegistry, RepositoryError,
    StorageObject, TokenAction,
};
use glassline::workflows::pricing::{
    AuditEntry, AuditError, AuditSink, PricebookRepository, PricebookVersion, VersionId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryJobStore {
    records: Arc<Mutex<HashMap<JobId, JobRecord>>>,
}

impl JobRepository for InMemoryJobStore {
    fn insert(&self, record: JobRecord) -> Result<JobRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("job store mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        let guard = self.records.lock().expect("job store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_upload_token(
        &self,
        token: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<JobRecord>, RepositoryError> {
        let guard = self.records.lock().expect("job store mutex poisoned");
        Ok(guard
            .values()
            .find(|record| {
                record.upload_token.as_deref() == Some(token) && statuses.contains(&record.status)
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
        let mut guard = self.records.lock().expect("job store mutex poisoned");
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
        let mut guard = self.records.lock().expect("job store mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.document = document;
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryObjectRegistry {
    objects: Arc<Mutex<Vec<StorageObject>>>,
}

impl ObjectRegistry for InMemoryObjectRegistry {
    fn register(&self, object: StorageObject) -> Result<StorageObject, RepositoryError> {
        let mut guard = self.objects.lock().expect("object registry mutex poisoned");
        if guard.iter().any(|stored| stored.upload_id == object.upload_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(object.clone());
        Ok(object)
    }

    fn find_by_upload_id(&self, upload_id: &str) -> Result<Option<StorageObject>, RepositoryError> {
        let guard = self.objects.lock().expect("object registry mutex poisoned");
        Ok(guard
            .iter()
            .find(|object| object.upload_id == upload_id)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryPricebookStore {
    versions: Arc<Mutex<HashMap<VersionId, PricebookVersion>>>,
}

impl PricebookRepository for InMemoryPricebookStore {
    fn insert_version(
        &self,
        version: PricebookVersion,
    ) -> Result<PricebookVersion, RepositoryError> {
        let mut guard = self.versions.lock().expect("pricebook store mutex poisoned");
        if guard.contains_key(&version.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(version.id.clone(), version.clone());
        Ok(version)
    }

    fn update_version(&self, version: PricebookVersion) -> Result<(), RepositoryError> {
        let mut guard = self.versions.lock().expect("pricebook store mutex poisoned");
        if guard.contains_key(&version.id) {
            guard.insert(version.id.clone(), version);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch_version(&self, id: &VersionId) -> Result<Option<PricebookVersion>, RepositoryError> {
        let guard = self.versions.lock().expect("pricebook store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list_versions(&self) -> Result<Vec<PricebookVersion>, RepositoryError> {
        let guard = self.versions.lock().expect("pricebook store mutex poisoned");
        let mut versions: Vec<_> = guard.values().cloned().collect();
        versions.sort_by_key(|version| version.version);
        Ok(versions)
    }
}

/// Audit log backed by process memory, mirrored to the structured log so
/// entries survive in the log pipeline even without a durable table.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub(crate) fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit log mutex poisoned").clone()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        info!(
            action = entry.action.label(),
            actor = %entry.actor,
            job_id = entry.job_id.as_ref().map(|id| id.0.as_str()),
            "audit entry recorded"
        );
        let mut guard = self.entries.lock().expect("audit log mutex poisoned");
        guard.push(entry);
        Ok(())
    }
}

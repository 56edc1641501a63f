use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::config::UploadConfig;
use crate::workflows::jobs::domain::{JobDocument, JobId, JobRecord, JobStatus, StorageObject};
use crate::workflows::jobs::hooks::{HookRequest, UploadLifecycle};
use crate::workflows::jobs::repository::{
    JobRepository, ObjectRegistry, RepositoryError, TokenAction,
};

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

#[derive(Default, Clone)]
pub(super) struct MemoryObjects {
    objects: Arc<Mutex<Vec<StorageObject>>>,
}

impl MemoryObjects {
    pub(super) fn all(&self) -> Vec<StorageObject> {
        self.objects.lock().expect("object mutex poisoned").clone()
    }
}

impl ObjectRegistry for MemoryObjects {
    fn register(&self, object: StorageObject) -> Result<StorageObject, RepositoryError> {
        let mut guard = self.objects.lock().expect("object mutex poisoned");
        guard.push(object.clone());
        Ok(object)
    }

    fn find_by_upload_id(
        &self,
        upload_id: &str,
    ) -> Result<Option<StorageObject>, RepositoryError> {
        let guard = self.objects.lock().expect("object mutex poisoned");
        Ok(guard
            .iter()
            .find(|object| object.upload_id == upload_id)
            .cloned())
    }
}

pub(super) fn upload_config() -> UploadConfig {
    UploadConfig {
        bucket: "scan-intake".to_string(),
        object_ttl_days: 30,
    }
}

pub(super) fn lifecycle(
    jobs: &MemoryJobs,
    objects: &MemoryObjects,
) -> UploadLifecycle<MemoryJobs, MemoryObjects> {
    UploadLifecycle::new(
        Arc::new(jobs.clone()),
        Arc::new(objects.clone()),
        &upload_config(),
    )
}

pub(super) fn created_job(id: &str, token: &str) -> JobRecord {
    JobRecord::created(
        JobId(id.to_string()),
        token.to_string(),
        Utc::now() + Duration::minutes(15),
    )
}

pub(super) fn expired_job(id: &str, token: &str) -> JobRecord {
    let mut record = created_job(id, token);
    record.upload_token_expiry = Some(Utc::now() - Duration::minutes(1));
    record
}

pub(super) fn hook_request(hook_type: &str, token: Option<&str>, upload_id: &str) -> HookRequest {
    let mut meta_data = BTreeMap::new();
    if let Some(token) = token {
        meta_data.insert("token".to_string(), token.to_string());
    }
    let payload = serde_json::json!({
        "Type": hook_type,
        "Event": {
            "Upload": {
                "ID": upload_id,
                "Size": 48_213,
                "MetaData": meta_data,
                "Storage": {},
            }
        }
    });
    serde_json::from_value(payload).expect("valid hook payload")
}

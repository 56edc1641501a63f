use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::UploadConfig;

use super::domain::{JobStatus, StorageObject};
use super::repository::{JobRepository, ObjectRegistry, RepositoryError, TokenAction};

/// Object key used when neither the placement info nor the upload id
/// yields a usable name.
pub const DEFAULT_OBJECT_NAME: &str = "scan.pdf";

const TOKEN_METADATA_KEY: &str = "token";
const FILETYPE_METADATA_KEY: &str = "filetype";
const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

/// Callback envelope delivered by the upload gateway. Field names follow
/// the gateway's wire contract, hence the PascalCase renames.
#[derive(Debug, Clone, Deserialize)]
pub struct HookRequest {
    #[serde(rename = "Type", default)]
    pub hook_type: Option<String>,
    #[serde(rename = "Event")]
    pub event: HookEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookEvent {
    #[serde(rename = "Upload")]
    pub upload: UploadDescriptor,
}

/// The gateway's view of one chunked upload session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadDescriptor {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "MetaData", default)]
    pub meta_data: BTreeMap<String, String>,
    #[serde(rename = "Storage", default)]
    pub storage: BTreeMap<String, String>,
}

impl UploadDescriptor {
    pub fn token(&self) -> Option<&str> {
        self.meta_data.get(TOKEN_METADATA_KEY).map(String::as_str)
    }

    /// Final object key: explicit placement key first, then the upload-id
    /// prefix ahead of the first `+` (the gateway's storage-backend id
    /// convention), then the fixed default name.
    pub fn storage_key(&self) -> String {
        if let Some(key) = self.storage.get("Key") {
            if !key.is_empty() {
                return key.clone();
            }
        }
        match self.id.split('+').next() {
            Some(prefix) if !prefix.is_empty() => prefix.to_string(),
            _ => DEFAULT_OBJECT_NAME.to_string(),
        }
    }
}

/// How a hook call was absorbed. The gateway retries anything that does
/// not read as success, so `Ignored` still answers HTTP 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// The callback advanced a job.
    Accepted,
    /// No-op acknowledgement (unknown hook type, absent job, or a
    /// duplicate finalize delivery).
    Ignored,
}

/// Errors surfaced to the gateway. Only the authorization gate rejects;
/// everything else on the callback path is absorbed or is a store failure.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("upload token missing, unknown, or expired")]
    Forbidden,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The job state machine, driven exclusively by upload-gateway callbacks.
pub struct UploadLifecycle<J, O> {
    jobs: Arc<J>,
    objects: Arc<O>,
    bucket: String,
    object_ttl_days: u32,
}

impl<J, O> UploadLifecycle<J, O>
where
    J: JobRepository,
    O: ObjectRegistry,
{
    pub fn new(jobs: Arc<J>, objects: Arc<O>, config: &UploadConfig) -> Self {
        Self {
            jobs,
            objects,
            bucket: config.bucket.clone(),
            object_ttl_days: config.object_ttl_days,
        }
    }

    /// Route a callback by its `Type` discriminator. Unrecognized types are
    /// acknowledged no-ops; a failure answer would only make the gateway
    /// retry a call we will never handle.
    pub fn dispatch(&self, request: &HookRequest) -> Result<HookOutcome, HookError> {
        match request.hook_type.as_deref() {
            Some("pre-create") => self.validate_pre_create(&request.event.upload),
            Some("post-finish") => self.finalize_upload(&request.event.upload),
            other => {
                info!(hook_type = ?other, "ignoring unrecognized upload hook");
                Ok(HookOutcome::Ignored)
            }
        }
    }

    /// Authorization gate the gateway must pass before accepting bytes.
    /// The job must hold the supplied token, sit in exactly `Created`, and
    /// carry an unexpired token. Success moves it to `Uploading`.
    pub fn validate_pre_create(&self, upload: &UploadDescriptor) -> Result<HookOutcome, HookError> {
        let token = upload.token().ok_or(HookError::Forbidden)?;
        let job = self
            .jobs
            .find_by_upload_token(token, &[JobStatus::Created])?
            .ok_or(HookError::Forbidden)?;
        let expiry = job.upload_token_expiry.ok_or(HookError::Forbidden)?;
        if expiry < Utc::now() {
            return Err(HookError::Forbidden);
        }

        self.jobs.transition(
            &job.id,
            &[JobStatus::Created],
            JobStatus::Uploading,
            TokenAction::Keep,
        )?;
        Ok(HookOutcome::Accepted)
    }

    /// Register the finished upload and move the job to `Uploaded`,
    /// consuming the token in the same write.
    ///
    /// "Job not found" here is absorbed to success: the callback channel
    /// has no useful retry semantics for it. Duplicate deliveries of the
    /// same upload id are detected through the object registry and never
    /// produce a second `StorageObject` or reopen a cleared token.
    pub fn finalize_upload(&self, upload: &UploadDescriptor) -> Result<HookOutcome, HookError> {
        let Some(token) = upload.token() else {
            warn!(upload_id = %upload.id, "post-finish hook without token metadata, acknowledging");
            return Ok(HookOutcome::Ignored);
        };
        let Some(job) = self
            .jobs
            .find_by_upload_token(token, &[JobStatus::Created, JobStatus::Uploading])?
        else {
            warn!(upload_id = %upload.id, "post-finish hook for unknown job, acknowledging");
            return Ok(HookOutcome::Ignored);
        };

        if self.objects.find_by_upload_id(&upload.id)?.is_some() {
            info!(job_id = %job.id, upload_id = %upload.id, "upload already finalized");
            return Ok(HookOutcome::Ignored);
        }

        let bucket = upload
            .storage
            .get("Bucket")
            .filter(|bucket| !bucket.is_empty())
            .cloned()
            .unwrap_or_else(|| self.bucket.clone());
        let content_type = upload
            .meta_data
            .get(FILETYPE_METADATA_KEY)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        self.objects.register(StorageObject {
            job_id: job.id.clone(),
            upload_id: upload.id.clone(),
            bucket,
            key: upload.storage_key(),
            size: upload.size,
            content_type,
            ttl_days: self.object_ttl_days,
            expires_at: Utc::now() + Duration::days(i64::from(self.object_ttl_days)),
        })?;

        self.jobs.transition(
            &job.id,
            &[JobStatus::Created, JobStatus::Uploading],
            JobStatus::Uploaded,
            TokenAction::Consume,
        )?;
        info!(job_id = %job.id, upload_id = %upload.id, "upload registered, job marked uploaded");
        Ok(HookOutcome::Accepted)
    }
}

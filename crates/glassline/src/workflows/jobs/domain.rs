use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflows::pricing::domain::QuotePricing;

/// Identifier wrapper for pipeline jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle states for a scanned-document job.
///
/// This core drives `Created -> Uploading -> Uploaded`; the measurement,
/// pricing, and rendering stages are opaque writes performed by external
/// workers. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Uploading,
    Uploaded,
    Measuring,
    Pricing,
    Rendering,
    Done,
    Failed,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Uploading => "UPLOADING",
            JobStatus::Uploaded => "UPLOADED",
            JobStatus::Measuring => "MEASURING",
            JobStatus::Pricing => "PRICING",
            JobStatus::Rendering => "RENDERING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// The job's single-source-of-truth document: derived measurement output
/// (opaque to this core) plus the typed pricing result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(default)]
    pub measurement: Option<Value>,
    #[serde(default)]
    pub pricing: Option<QuotePricing>,
}

/// Durable record for one unit of work.
///
/// Invariant: `upload_token` is present only while status is `Created` or
/// `Uploading`; consuming it at the `Uploaded` transition is irreversible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub upload_token: Option<String>,
    pub upload_token_expiry: Option<DateTime<Utc>>,
    /// Per-stage progress written by external workers; treated as opaque.
    #[serde(default)]
    pub stage_progress: Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub document: JobDocument,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A freshly intaken job, as the external intake flow would create it.
    pub fn created(id: JobId, upload_token: String, expiry: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Created,
            upload_token: Some(upload_token),
            upload_token_expiry: Some(expiry),
            stage_progress: Value::Null,
            error_code: None,
            error_message: None,
            document: JobDocument::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A registered blob produced by a finished upload. Created exactly once
/// per upload id, at the `Uploaded` transition; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageObject {
    pub job_id: JobId,
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub content_type: String,
    pub ttl_days: u32,
    pub expires_at: DateTime<Utc>,
}

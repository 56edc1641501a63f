use super::domain::{JobDocument, JobId, JobRecord, JobStatus, StorageObject};

/// Whether a conditional transition also consumes the one-shot upload token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    Keep,
    Consume,
}

/// Durable record store contract consumed by the job state machine and the
/// pricing engine. Each call is a single-record transaction; `transition`
/// is the conditional update the state machine relies on for serialization.
pub trait JobRepository: Send + Sync {
    fn insert(&self, record: JobRecord) -> Result<JobRecord, RepositoryError>;
    fn fetch(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError>;
    /// Find the job holding `token` whose status is one of `statuses`.
    fn find_by_upload_token(
        &self,
        token: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<JobRecord>, RepositoryError>;
    /// Conditional single-record update: move `id` from one of `expected`
    /// to `to`, optionally clearing the upload token in the same write.
    /// Returns `Conflict` when the stored status no longer matches.
    fn transition(
        &self,
        id: &JobId,
        expected: &[JobStatus],
        to: JobStatus,
        token: TokenAction,
    ) -> Result<JobRecord, RepositoryError>;
    /// Whole-document replace of the job's SSOT.
    fn replace_document(&self, id: &JobId, document: JobDocument) -> Result<(), RepositoryError>;
}

/// Blob store contract consumed by this core: register-only, plus the
/// upload-id lookup backing the finalize idempotency check.
pub trait ObjectRegistry: Send + Sync {
    fn register(&self, object: StorageObject) -> Result<StorageObject, RepositoryError>;
    fn find_by_upload_id(&self, upload_id: &str) -> Result<Option<StorageObject>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or changed underneath the update")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

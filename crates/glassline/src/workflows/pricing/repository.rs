use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflows::jobs::domain::JobId;
use crate::workflows::jobs::repository::RepositoryError;

use super::domain::{PricebookVersion, VersionId};

/// Durable store contract for pricebook versions. Rule edits go through a
/// whole-record replace of the owning version, so the store's per-record
/// atomicity serializes them.
pub trait PricebookRepository: Send + Sync {
    fn insert_version(
        &self,
        version: PricebookVersion,
    ) -> Result<PricebookVersion, RepositoryError>;
    fn update_version(&self, version: PricebookVersion) -> Result<(), RepositoryError>;
    fn fetch_version(&self, id: &VersionId) -> Result<Option<PricebookVersion>, RepositoryError>;
    /// All versions ordered by version number.
    fn list_versions(&self) -> Result<Vec<PricebookVersion>, RepositoryError>;
}

/// Action kinds recorded against the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    PriceOverride,
    QuotePriced,
    VersionCreated,
    RuleCreated,
    RuleUpdated,
    RuleDeactivated,
}

impl AuditAction {
    pub fn label(&self) -> &'static str {
        match self {
            AuditAction::PriceOverride => "PRICE_OVERRIDE",
            AuditAction::QuotePriced => "QUOTE_PRICED",
            AuditAction::VersionCreated => "VERSION_CREATED",
            AuditAction::RuleCreated => "RULE_CREATED",
            AuditAction::RuleUpdated => "RULE_UPDATED",
            AuditAction::RuleDeactivated => "RULE_DEACTIVATED",
        }
    }
}

/// Append-only record of one mutating pricing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Absent for pricebook-administration actions not tied to a job.
    pub job_id: Option<JobId>,
    pub actor: String,
    pub action: AuditAction,
    pub diff: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Sink for audit entries (database table, log shipper, or a test double).
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

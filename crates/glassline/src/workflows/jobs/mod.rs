//! Job lifecycle state machine driven by upload-gateway callbacks.
//!
//! The gateway calls back at two points: `pre-create` (the token
//! authorization gate) and `post-finish` (artifact registration). Both
//! arrive on one dispatch endpoint routed by a `Type` discriminator.
//! All serialization comes from the record store's conditional updates;
//! there is no in-process locking here.

pub mod domain;
pub mod hooks;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use domain::{JobDocument, JobId, JobRecord, JobStatus, StorageObject};
pub use hooks::{
    HookError, HookEvent, HookOutcome, HookRequest, UploadDescriptor, UploadLifecycle,
    DEFAULT_OBJECT_NAME,
};
pub use repository::{JobRepository, ObjectRegistry, RepositoryError, TokenAction};
pub use router::hook_router;

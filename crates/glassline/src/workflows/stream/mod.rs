//! Live job status over server-sent events. Read-only: per-connection
//! tasks poll the job record and forward changes, with comment-frame
//! heartbeats keeping idle connections alive.

pub mod router;
pub mod watch;

pub use router::stream_router;
pub use watch::{StatusStream, StreamError, StreamFrame};

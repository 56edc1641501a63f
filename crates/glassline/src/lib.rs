//! Core library for the scanned-document quoting pipeline.
//!
//! Three coupled pieces live here: the upload-driven job state machine
//! (`workflows::jobs`), the versioned pricing-rule engine with manual
//! override support (`workflows::pricing`), and the per-connection job
//! status stream (`workflows::stream`). Storage is abstracted behind
//! traits so every component can be exercised against in-memory doubles.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

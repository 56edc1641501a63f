use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::config::StreamConfig;
use crate::workflows::jobs::domain::{JobId, JobRecord};
use crate::workflows::jobs::repository::{JobRepository, RepositoryError};

/// Frames emitted over a status connection. Built before the wire encoding
/// so the poll loop stays inspectable.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Current status and stage progress; sent only when either changed.
    Status {
        job_id: String,
        status: String,
        progress: Value,
        error_code: Option<String>,
        error_message: Option<String>,
    },
    /// Final frame once the job reaches a terminal status.
    Complete { job_id: String, status: String },
    /// The record vanished or the store stopped answering mid-stream.
    Error { job_id: String },
}

impl StreamFrame {
    fn status(record: &JobRecord) -> Self {
        StreamFrame::Status {
            job_id: record.id.0.clone(),
            status: record.status.label().to_string(),
            progress: record.stage_progress.clone(),
            error_code: record.error_code.clone(),
            error_message: record.error_message.clone(),
        }
    }

    fn into_event(self) -> Event {
        match self {
            StreamFrame::Status {
                job_id,
                status,
                progress,
                error_code,
                error_message,
            } => Event::default().event("status").data(
                json!({
                    "jobId": job_id,
                    "status": status,
                    "stageProgress": progress,
                    "errorCode": error_code,
                    "errorMessage": error_message,
                })
                .to_string(),
            ),
            StreamFrame::Complete { job_id, status } => Event::default()
                .event("complete")
                .data(json!({ "jobId": job_id, "status": status }).to_string()),
            StreamFrame::Error { job_id } => Event::default().event("error").data(
                json!({ "jobId": job_id, "message": "job record no longer available" })
                    .to_string(),
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("job not found")]
    JobNotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Poll-based status fan-out. Each connection gets its own task that
/// re-reads the job record on a fixed cadence and pushes frames through a
/// bounded channel; nothing here ever writes to the store.
pub struct StatusStream<J> {
    jobs: Arc<J>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl<J> Clone for StatusStream<J> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            poll_interval: self.poll_interval,
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}

impl<J> StatusStream<J>
where
    J: JobRepository + 'static,
{
    pub fn new(jobs: Arc<J>, config: &StreamConfig) -> Self {
        Self {
            jobs,
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }

    /// Open an SSE response for `job_id`, rejecting unknown jobs before any
    /// stream machinery is set up.
    pub fn open(
        &self,
        job_id: &JobId,
    ) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StreamError> {
        if self.jobs.fetch(job_id)?.is_none() {
            return Err(StreamError::JobNotFound);
        }

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(self.clone().poll_job(job_id.clone(), tx));

        let stream = ReceiverStream::new(rx).map(|frame: StreamFrame| Ok(frame.into_event()));
        Ok(Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(self.heartbeat_interval)))
    }

    /// Per-connection poll loop. The first tick fires immediately, so a new
    /// subscriber always gets a snapshot before the cadence settles in.
    async fn poll_job(self, job_id: JobId, tx: mpsc::Sender<StreamFrame>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_sent: Option<(String, String)> = None;

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                return;
            }

            let record = match self.jobs.fetch(&job_id) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    let _ = tx.send(StreamFrame::Error { job_id: job_id.0 }).await;
                    return;
                }
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "status poll lost the record store");
                    let _ = tx.send(StreamFrame::Error { job_id: job_id.0 }).await;
                    return;
                }
            };

            let fingerprint = (
                record.status.label().to_string(),
                record.stage_progress.to_string(),
            );
            if last_sent.as_ref() != Some(&fingerprint) {
                if tx.send(StreamFrame::status(&record)).await.is_err() {
                    return;
                }
                last_sent = Some(fingerprint);
            }

            if record.status.is_terminal() {
                let _ = tx
                    .send(StreamFrame::Complete {
                        job_id: job_id.0,
                        status: record.status.label().to_string(),
                    })
                    .await;
                return;
            }
        }
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;

use crate::workflows::jobs::domain::JobId;
use crate::workflows::jobs::repository::JobRepository;

use super::watch::{StatusStream, StreamError};

/// Router builder for the live status endpoint.
pub fn stream_router<J>(stream: Arc<StatusStream<J>>) -> Router
where
    J: JobRepository + 'static,
{
    Router::new()
        .route("/api/v1/jobs/:job_id/stream", get(stream_handler::<J>))
        .with_state(stream)
}

async fn stream_handler<J>(
    State(stream): State<Arc<StatusStream<J>>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: JobRepository + 'static,
{
    match stream.open(&JobId(job_id)) {
        Ok(sse) => sse.into_response(),
        Err(StreamError::JobNotFound) => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": "job not found" })),
        )
            .into_response(),
        Err(StreamError::Repository(err)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

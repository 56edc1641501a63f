use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::json;

use super::hooks::{HookError, HookRequest, UploadLifecycle};
use super::repository::{JobRepository, ObjectRegistry};

/// Router builder exposing the gateway's dispatch endpoint.
pub fn hook_router<J, O>(service: Arc<UploadLifecycle<J, O>>) -> Router
where
    J: JobRepository + 'static,
    O: ObjectRegistry + 'static,
{
    Router::new()
        .route("/api/v1/uploads/hooks", post(hook_handler::<J, O>))
        .with_state(service)
}

pub(crate) async fn hook_handler<J, O>(
    State(service): State<Arc<UploadLifecycle<J, O>>>,
    axum::Json(request): axum::Json<HookRequest>,
) -> Response
where
    J: JobRepository + 'static,
    O: ObjectRegistry + 'static,
{
    match service.dispatch(&request) {
        Ok(_) => (StatusCode::OK, axum::Json(json!({}))).into_response(),
        Err(HookError::Forbidden) => {
            let payload = json!({
                "error": HookError::Forbidden.to_string(),
            });
            (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

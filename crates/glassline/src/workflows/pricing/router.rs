use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
    Router,
};
use serde_json::json;

use crate::workflows::jobs::domain::JobId;
use crate::workflows::jobs::repository::JobRepository;

use super::domain::{RuleId, VersionId};
use super::repository::{AuditSink, PricebookRepository};
use super::service::{
    CreateVersionRequest, OverrideRequest, PriceJobRequest, PricingError, PricingService, RuleSpec,
};

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        let status = match &self {
            PricingError::JobNotFound
            | PricingError::VersionNotFound
            | PricingError::RuleNotFound
            | PricingError::LineItemNotFound(_) => StatusCode::NOT_FOUND,
            PricingError::MissingPricing
            | PricingError::InvalidRequest(_)
            | PricingError::Evaluation(_) => StatusCode::BAD_REQUEST,
            PricingError::NoRuleMatched(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PricingError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = axum::Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Router builder exposing the pricing administration contract.
pub fn pricing_router<P, J, A>(service: Arc<PricingService<P, J, A>>) -> Router
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/pricebooks",
            post(create_version_handler::<P, J, A>).get(list_versions_handler::<P, J, A>),
        )
        .route(
            "/api/v1/pricebooks/:version_id/rules",
            post(create_rule_handler::<P, J, A>).get(list_rules_handler::<P, J, A>),
        )
        .route(
            "/api/v1/pricebooks/:version_id/rules/:rule_id",
            put(update_rule_handler::<P, J, A>).delete(deactivate_rule_handler::<P, J, A>),
        )
        .route("/api/v1/jobs/:job_id/price", post(price_job_handler::<P, J, A>))
        .route(
            "/api/v1/jobs/:job_id/line-items/:item_id/override",
            post(override_handler::<P, J, A>),
        )
        .with_state(service)
}

async fn create_version_handler<P, J, A>(
    State(service): State<Arc<PricingService<P, J, A>>>,
    axum::Json(request): axum::Json<CreateVersionRequest>,
) -> Response
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    match service.create_version(request) {
        Ok(version) => (StatusCode::CREATED, axum::Json(version)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_versions_handler<P, J, A>(
    State(service): State<Arc<PricingService<P, J, A>>>,
) -> Response
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    match service.list_versions() {
        Ok(versions) => (StatusCode::OK, axum::Json(versions)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_rules_handler<P, J, A>(
    State(service): State<Arc<PricingService<P, J, A>>>,
    Path(version_id): Path<String>,
) -> Response
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    match service.list_rules(&VersionId(version_id)) {
        Ok(rules) => (StatusCode::OK, axum::Json(rules)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn create_rule_handler<P, J, A>(
    State(service): State<Arc<PricingService<P, J, A>>>,
    Path(version_id): Path<String>,
    axum::Json(spec): axum::Json<RuleSpec>,
) -> Response
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    match service.create_rule(&VersionId(version_id), spec) {
        Ok(rule) => (StatusCode::CREATED, axum::Json(rule)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn update_rule_handler<P, J, A>(
    State(service): State<Arc<PricingService<P, J, A>>>,
    Path((version_id, rule_id)): Path<(String, String)>,
    axum::Json(spec): axum::Json<RuleSpec>,
) -> Response
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    match service.update_rule(&VersionId(version_id), &RuleId(rule_id), spec) {
        Ok(rule) => (StatusCode::OK, axum::Json(rule)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn deactivate_rule_handler<P, J, A>(
    State(service): State<Arc<PricingService<P, J, A>>>,
    Path((version_id, rule_id)): Path<(String, String)>,
) -> Response
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    match service.deactivate_rule(&VersionId(version_id), &RuleId(rule_id)) {
        Ok(rule) => (StatusCode::OK, axum::Json(rule)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn price_job_handler<P, J, A>(
    State(service): State<Arc<PricingService<P, J, A>>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<PriceJobRequest>,
) -> Response
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    match service.price_job(&JobId(job_id), request) {
        Ok(pricing) => (StatusCode::OK, axum::Json(pricing)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn override_handler<P, J, A>(
    State(service): State<Arc<PricingService<P, J, A>>>,
    Path((job_id, item_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<OverrideRequest>,
) -> Response
where
    P: PricebookRepository + 'static,
    J: JobRepository + 'static,
    A: AuditSink + 'static,
{
    match service.apply_override(&JobId(job_id), &item_id, request) {
        Ok(item) => (StatusCode::OK, axum::Json(item)).into_response(),
        Err(err) => err.into_response(),
    }
}

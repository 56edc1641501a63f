use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use crate::workflows::jobs::domain::{JobId, JobStatus};
use crate::workflows::jobs::hooks::{HookError, HookOutcome, UploadDescriptor};
use crate::workflows::jobs::router::hook_router;

use super::common::{created_job, expired_job, hook_request, lifecycle, MemoryJobs, MemoryObjects};

#[test]
fn pre_create_transitions_created_job_to_uploading() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    jobs.seed(created_job("job-1", "tok-alpha"));
    let service = lifecycle(&jobs, &objects);

    let outcome = service
        .dispatch(&hook_request("pre-create", Some("tok-alpha"), "up-1"))
        .expect("pre-create accepted");

    assert_eq!(outcome, HookOutcome::Accepted);
    let stored = jobs.get(&JobId("job-1".to_string())).expect("job present");
    assert_eq!(stored.status, JobStatus::Uploading);
    assert!(stored.upload_token.is_some(), "token survives pre-create");
}

#[test]
fn pre_create_rejects_missing_unknown_and_expired_tokens() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    jobs.seed(created_job("job-1", "tok-alpha"));
    jobs.seed(expired_job("job-2", "tok-stale"));
    let service = lifecycle(&jobs, &objects);

    for request in [
        hook_request("pre-create", None, "up-1"),
        hook_request("pre-create", Some("tok-wrong"), "up-1"),
        hook_request("pre-create", Some("tok-stale"), "up-1"),
    ] {
        match service.dispatch(&request) {
            Err(HookError::Forbidden) => {}
            other => panic!("expected forbidden, got {other:?}"),
        }
    }
}

#[test]
fn pre_create_succeeds_exactly_once_per_token() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    jobs.seed(created_job("job-1", "tok-alpha"));
    let service = lifecycle(&jobs, &objects);
    let request = hook_request("pre-create", Some("tok-alpha"), "up-1");

    service.dispatch(&request).expect("first call accepted");

    // The job left CREATED, so the same token no longer authorizes.
    match service.dispatch(&request) {
        Err(HookError::Forbidden) => {}
        other => panic!("expected forbidden on replay, got {other:?}"),
    }
}

#[test]
fn finalize_registers_object_and_consumes_token() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    jobs.seed(created_job("job-1", "tok-alpha"));
    let service = lifecycle(&jobs, &objects);

    service
        .dispatch(&hook_request("pre-create", Some("tok-alpha"), "up-1+part"))
        .expect("pre-create accepted");
    let outcome = service
        .dispatch(&hook_request("post-finish", Some("tok-alpha"), "up-1+part"))
        .expect("post-finish accepted");

    assert_eq!(outcome, HookOutcome::Accepted);
    let stored = jobs.get(&JobId("job-1".to_string())).expect("job present");
    assert_eq!(stored.status, JobStatus::Uploaded);
    assert!(stored.upload_token.is_none(), "token consumed");
    assert!(stored.upload_token_expiry.is_none());

    let registered = objects.all();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].key, "up-1", "upload id prefix before '+'");
    assert_eq!(registered[0].bucket, "scan-intake");
    assert_eq!(registered[0].size, 48_213);
    assert_eq!(registered[0].ttl_days, 30);
}

#[test]
fn finalize_for_unknown_job_is_absorbed_as_success() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    let service = lifecycle(&jobs, &objects);

    let outcome = service
        .dispatch(&hook_request("post-finish", Some("tok-nobody"), "up-9"))
        .expect("absent job acknowledged");

    assert_eq!(outcome, HookOutcome::Ignored);
    assert!(objects.all().is_empty());
}

#[test]
fn finalize_is_idempotent_per_upload_id() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    jobs.seed(created_job("job-1", "tok-alpha"));
    let service = lifecycle(&jobs, &objects);
    let finish = hook_request("post-finish", Some("tok-alpha"), "up-1+part");

    service.dispatch(&finish).expect("first finalize");
    let replay = service.dispatch(&finish).expect("replay acknowledged");

    assert_eq!(replay, HookOutcome::Ignored);
    assert_eq!(objects.all().len(), 1, "no duplicate storage object");
    let stored = jobs.get(&JobId("job-1".to_string())).expect("job present");
    assert_eq!(stored.status, JobStatus::Uploaded);
    assert!(stored.upload_token.is_none(), "token stays cleared");
}

#[test]
fn finalize_replay_with_live_token_hits_registry_guard() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    jobs.seed(created_job("job-1", "tok-alpha"));
    let service = lifecycle(&jobs, &objects);

    service
        .dispatch(&hook_request("post-finish", Some("tok-alpha"), "up-1"))
        .expect("first finalize");
    // Simulate the delivery racing ahead of the status write: restore a
    // token-bearing job and replay the same upload id.
    jobs.seed(created_job("job-1", "tok-alpha"));

    let replay = service
        .dispatch(&hook_request("post-finish", Some("tok-alpha"), "up-1"))
        .expect("replay acknowledged");

    assert_eq!(replay, HookOutcome::Ignored);
    assert_eq!(objects.all().len(), 1, "registry guard blocks duplicates");
}

#[test]
fn dispatch_acknowledges_unknown_hook_types() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    let service = lifecycle(&jobs, &objects);

    let outcome = service
        .dispatch(&hook_request("post-terminate", Some("tok-alpha"), "up-1"))
        .expect("unknown type acknowledged");

    assert_eq!(outcome, HookOutcome::Ignored);
}

#[test]
fn storage_key_prefers_explicit_placement() {
    let mut upload = UploadDescriptor {
        id: "abc+123".to_string(),
        ..UploadDescriptor::default()
    };
    upload
        .storage
        .insert("Key".to_string(), "scans/job-1.pdf".to_string());

    assert_eq!(upload.storage_key(), "scans/job-1.pdf");
}

#[test]
fn storage_key_falls_back_to_default_name() {
    let upload = UploadDescriptor::default();
    assert_eq!(upload.storage_key(), super::super::DEFAULT_OBJECT_NAME);
}

#[tokio::test]
async fn hook_endpoint_maps_forbidden_to_403() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    let app = hook_router(Arc::new(lifecycle(&jobs, &objects)));

    let body = serde_json::json!({
        "Type": "pre-create",
        "Event": { "Upload": { "ID": "up-1", "MetaData": { "token": "tok-unknown" } } }
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/uploads/hooks")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn hook_endpoint_acknowledges_unknown_types_with_200() {
    let jobs = MemoryJobs::default();
    let objects = MemoryObjects::default();
    let app = hook_router(Arc::new(lifecycle(&jobs, &objects)));

    let body = serde_json::json!({
        "Type": "post-receive",
        "Event": { "Upload": { "ID": "up-1" } }
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/uploads/hooks")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
}

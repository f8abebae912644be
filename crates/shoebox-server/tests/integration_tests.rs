//! Integration tests for the HTTP surface

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shoebox_domain::{ManualClock, OwnerId, SECONDS_PER_DAY};
use shoebox_engine::{EngineConfig, InMemoryStorage, LifecycleEngine, RetryConfig};
use shoebox_scheduler::{Scheduler, SchedulerConfig};
use shoebox_server::{
    build_state,
    config::{ServerConfig, StoreConfig},
    dto::{
        ErrorResponse, HealthResponse, LedgerCheckResponse, PhotoResponse, QuotaResponse,
        RuleSetResponse, SweepResponse,
    },
    handlers::{create_router, AppState},
};
use shoebox_store::SqliteStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt; // for oneshot

const T0: u64 = 1_700_000_000;

/// App over an in-memory store driven by a manual clock
fn create_test_app() -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let config = EngineConfig {
        retry: RetryConfig::immediate(),
        ..Default::default()
    };
    let engine = Arc::new(
        LifecycleEngine::new(
            Arc::new(SqliteStore::new(":memory:").unwrap()),
            Arc::new(InMemoryStorage::new()),
            &config,
        )
        .unwrap()
        .with_clock(clock.clone()),
    );
    let scheduler = Arc::new(Scheduler::new(engine.clone(), SchedulerConfig::default()));

    let state = AppState {
        engine,
        scheduler,
        shutdown: CancellationToken::new(),
    };
    (create_router(state), clock)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap()
}

async fn upload(app: &Router, owner: OwnerId, size: u64) -> PhotoResponse {
    let (status, body) = send(
        app,
        "POST",
        "/photos",
        Some(json!({"owner_id": owner.to_string(), "original_size": size, "thumbnail_size": 24})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    parse(&body)
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, _) = create_test_app();
    upload(&app, OwnerId::new(), 1_000).await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let health: HealthResponse = parse(&body);
    assert_eq!(health.status, "healthy");
    assert_eq!(health.owners, 1);
    assert!(!health.sweep_running);
}

#[tokio::test]
async fn test_create_and_fetch_rule_set() {
    let (app, _) = create_test_app();
    let owner = OwnerId::new();

    let (status, body) = send(
        &app,
        "POST",
        "/rulesets",
        Some(json!({
            "owner_id": owner.to_string(),
            "rules": [
                {"age_threshold_days": 30, "action": "move_to_cold_tier"},
                {"age_threshold_days": 180, "action": "delete"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: RuleSetResponse = parse(&body);
    assert_eq!(created.album_id, None);
    assert_eq!(created.rules.len(), 2);
    assert!(created.rules.iter().all(|r| r.id.is_some()));

    let (status, body) = send(&app, "GET", &format!("/rulesets/{}", created.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: RuleSetResponse = parse(&body);
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.rules[1].action, "delete");
}

#[tokio::test]
async fn test_invalid_rule_set_lists_every_reason() {
    let (app, _) = create_test_app();

    let (status, body) = send(
        &app,
        "POST",
        "/rulesets",
        Some(json!({
            "owner_id": OwnerId::new().to_string(),
            "rules": [
                {"age_threshold_days": 180, "action": "delete"},
                {"age_threshold_days": 30, "action": "move_to_cold_tier"},
                {"age_threshold_days": 0, "action": "delete"},
                {"age_threshold_days": 400, "action": "delete"}
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = parse(&body);
    assert_eq!(error.error, "Rule set rejected");
    assert!(error.reasons.len() >= 3);
    assert!(error.reasons.iter().any(|r| r.contains("at most 3")));
}

#[tokio::test]
async fn test_update_rule_set() {
    let (app, _) = create_test_app();
    let owner = OwnerId::new();
    let (_, body) = send(
        &app,
        "POST",
        "/rulesets",
        Some(json!({"owner_id": owner.to_string(), "rules": []})),
    )
    .await;
    let created: RuleSetResponse = parse(&body);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/rulesets/{}", created.id),
        Some(json!({
            "owner_id": owner.to_string(),
            "rules": [{"age_threshold_days": 90, "action": "delete"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updated: RuleSetResponse = parse(&body);
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.rules[0].age_threshold_days, 90);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/rulesets/{}", shoebox_domain::RuleSetId::new()),
        Some(json!({"owner_id": owner.to_string(), "rules": []})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_identifiers_are_bad_requests() {
    let (app, _) = create_test_app();

    let (status, body) = send(&app, "GET", "/photos/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = parse(&body);
    assert!(error.reasons.is_empty());

    let (status, _) = send(
        &app,
        "POST",
        "/rulesets",
        Some(json!({
            "owner_id": OwnerId::new().to_string(),
            "rules": [{"age_threshold_days": 30, "action": "archive"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_freeze_unfreeze_and_cooldown() {
    let (app, clock) = create_test_app();
    let owner = OwnerId::new();
    let photo = upload(&app, owner, 1_000).await;

    let (status, body) = send(&app, "POST", &format!("/photos/{}/freeze", photo.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let quota: QuotaResponse = parse(&body);
    assert_eq!(quota.used_space, 512);
    assert_eq!(quota.available, None);

    let (status, _) = send(&app, "POST", &format!("/photos/{}/freeze", photo.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", &format!("/photos/{}/unfreeze", photo.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let quota: QuotaResponse = parse(&body);
    assert_eq!(quota.used_space, 1_024);

    let (status, body) = send(&app, "POST", &format!("/photos/{}/freeze", photo.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = parse(&body);
    assert!(error.error.contains("cannot be frozen"));

    clock.advance_secs(30 * SECONDS_PER_DAY);
    let (status, _) = send(&app, "POST", &format!("/photos/{}/freeze", photo.id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/photos/{}/freeze", shoebox_domain::PhotoId::new()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_quota_limit_refuses_uploads() {
    let (app, _) = create_test_app();
    let owner = OwnerId::new();

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/owners/{}/quota", owner),
        Some(json!({"quota_limit": 2_000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let quota: QuotaResponse = parse(&body);
    assert_eq!(quota.quota_limit, 2_000);
    assert_eq!(quota.available, Some(2_000));

    upload(&app, owner, 1_500).await;
    let (status, body) = send(
        &app,
        "POST",
        "/photos",
        Some(json!({"owner_id": owner.to_string(), "original_size": 1_000})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = parse(&body);
    assert!(error.error.contains("Quota exceeded"));

    let (_, body) = send(&app, "GET", &format!("/owners/{}/quota", owner), None).await;
    let quota: QuotaResponse = parse(&body);
    assert_eq!(quota.used_space, 1_524);
    assert_eq!(quota.available, Some(476));
}

#[tokio::test]
async fn test_oversized_upload_is_bad_request() {
    let (app, _) = create_test_app();
    let owner = OwnerId::new();

    let (status, body) = send(
        &app,
        "POST",
        "/photos",
        Some(json!({"owner_id": owner.to_string(), "original_size": u64::MAX, "thumbnail_size": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = parse(&body);
    assert!(error.error.contains("out of range"));

    let (_, body) = send(&app, "GET", &format!("/owners/{}/quota", owner), None).await;
    let quota: QuotaResponse = parse(&body);
    assert_eq!(quota.used_space, 0);
}

#[tokio::test]
async fn test_manual_sweep_dry_run_then_commit() {
    let (app, clock) = create_test_app();
    let owner = OwnerId::new();
    send(
        &app,
        "POST",
        "/rulesets",
        Some(json!({
            "owner_id": owner.to_string(),
            "rules": [
                {"age_threshold_days": 30, "action": "move_to_cold_tier"},
                {"age_threshold_days": 180, "action": "delete"}
            ]
        })),
    )
    .await;
    let photo = upload(&app, owner, 1_000).await;
    clock.advance_secs(200 * SECONDS_PER_DAY);

    let (status, body) = send(&app, "POST", "/lifecycle/run", Some(json!({"dry_run": true}))).await;
    assert_eq!(status, StatusCode::OK);
    let report: SweepResponse = parse(&body);
    assert!(report.dry_run);
    assert_eq!(report.transitions, 0);
    assert_eq!(report.owners[0].planned.len(), 1);
    assert_eq!(report.owners[0].planned[0].to, "deleted");

    let (_, body) = send(&app, "GET", &format!("/photos/{}", photo.id), None).await;
    let stored: PhotoResponse = parse(&body);
    assert_eq!(stored.storage_tier, "standard");

    // No body means a committing run
    let (status, body) = send(&app, "POST", "/lifecycle/run", None).await;
    assert_eq!(status, StatusCode::OK);
    let report: SweepResponse = parse(&body);
    assert!(!report.dry_run);
    assert_eq!(report.transitions, 1);

    let (_, body) = send(&app, "GET", &format!("/photos/{}", photo.id), None).await;
    let stored: PhotoResponse = parse(&body);
    assert_eq!(stored.storage_tier, "deleted");

    let (status, _) = send(&app, "POST", &format!("/photos/{}/freeze", photo.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, "GET", &format!("/owners/{}/quota", owner), None).await;
    let quota: QuotaResponse = parse(&body);
    assert_eq!(quota.used_space, 0);
}

#[tokio::test]
async fn test_quarantine_release_endpoint() {
    let (app, clock) = create_test_app();
    let owner = OwnerId::new();
    let (first, second) = (shoebox_domain::AlbumId::new(), shoebox_domain::AlbumId::new());
    for album in [first, second] {
        let (status, _) = send(
            &app,
            "POST",
            "/rulesets",
            Some(json!({
                "owner_id": owner.to_string(),
                "album_id": album.to_string(),
                "rules": [{"age_threshold_days": 10, "action": "delete"}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app,
        "POST",
        "/photos",
        Some(json!({
            "owner_id": owner.to_string(),
            "original_size": 100,
            "album_ids": [first.to_string(), second.to_string()]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let photo: PhotoResponse = parse(&body);
    assert_eq!(photo.album_ids.len(), 2);

    clock.advance_secs(11 * SECONDS_PER_DAY);
    let (_, body) = send(&app, "POST", "/lifecycle/run", Some(json!({}))).await;
    let report: SweepResponse = parse(&body);
    assert_eq!(report.owners[0].quarantined, 1);

    let (status, body) = send(&app, "POST", &format!("/photos/{}/release", photo.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let released: PhotoResponse = parse(&body);
    assert!(!released.quarantined);
    assert_eq!(released.storage_tier, "standard");
}

#[tokio::test]
async fn test_ledger_check_endpoint() {
    let (app, _) = create_test_app();
    upload(&app, OwnerId::new(), 300).await;

    let (status, body) = send(&app, "POST", "/ledger/check", None).await;
    assert_eq!(status, StatusCode::OK);
    let check: LedgerCheckResponse = parse(&body);
    assert!(check.consistent);
    assert!(check.drifted.is_empty());
    assert!(!check.repaired);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        store: StoreConfig {
            path: dir.path().join("shoebox.db").to_string_lossy().into_owned(),
        },
        ..Default::default()
    };
    let owner = OwnerId::new();

    {
        let app = create_router(build_state(&config).unwrap());
        let photo = upload(&app, owner, 2_000).await;
        let (status, _) = send(&app, "POST", &format!("/photos/{}/freeze", photo.id), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    // The ledger is rebuilt from the store on startup
    let app = create_router(build_state(&config).unwrap());
    let (_, body) = send(&app, "GET", &format!("/owners/{}/quota", owner), None).await;
    let quota: QuotaResponse = parse(&body);
    assert_eq!(quota.used_space, 1_012);
}

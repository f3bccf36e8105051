//! Health Endpoint Integration Tests
//!
//! Exercises the health routes against a published supervisor status.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use wallet_watcher::application::services::SlotStatus;
use wallet_watcher::infrastructure::health::router;
use wallet_watcher::{HealthServerState, SessionState, SharedSupervisorStatus, SupervisorStatus};

fn slot(slot: usize, state: SessionState) -> SlotStatus {
    SlotStatus {
        slot,
        state,
        addresses: 4,
        starts: 1,
        reconnect_needed: state == SessionState::Degraded,
    }
}

fn state_with(slots: Vec<SlotStatus>) -> Arc<HealthServerState> {
    let status = SharedSupervisorStatus::new(SupervisorStatus::new());
    status.publish(slots);
    Arc::new(HealthServerState::new("test-0.0.1".to_string(), status))
}

async fn get(state: Arc<HealthServerState>, uri: &str) -> (StatusCode, String) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn health_reports_every_slot() {
    let state = state_with(vec![
        slot(0, SessionState::Active),
        slot(1, SessionState::Degraded),
        slot(2, SessionState::Active),
    ]);

    let (status, body) = get(state, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["version"], "test-0.0.1");
    assert_eq!(json["active_sessions"], 2);
    assert_eq!(json["sessions"].as_array().unwrap().len(), 3);
    assert_eq!(json["sessions"][1]["state"], "degraded");
    assert_eq!(json["sessions"][1]["reconnect_needed"], true);
}

#[tokio::test]
async fn health_is_unavailable_with_no_active_slot() {
    let state = state_with(vec![
        slot(0, SessionState::Degraded),
        slot(1, SessionState::Connecting),
    ]);

    let (status, body) = get(state, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("\"unhealthy\""));
}

#[tokio::test]
async fn readiness_needs_one_active_slot() {
    let ready = state_with(vec![slot(0, SessionState::Idle), slot(1, SessionState::Active)]);
    assert_eq!(get(ready, "/readyz").await, (StatusCode::OK, "READY".to_string()));

    let not_ready = state_with(vec![slot(0, SessionState::Idle)]);
    assert_eq!(
        get(not_ready, "/readyz").await,
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY".to_string())
    );
}

#[tokio::test]
async fn liveness_always_ok() {
    let (status, body) = get(state_with(Vec::new()), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

//! HTTP API tests
//!
//! Requests go straight into the router with `tower::ServiceExt::oneshot`,
//! no listener involved.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use digiqueue_engine::prelude::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<SqliteQueueStore>,
    employee: EmployeeId,
    window: WorkstationId,
}

async fn create_test_app() -> TestApp {
    let store = Arc::new(SqliteQueueStore::new_in_memory().await.unwrap());
    store.add_responsibility("Passport", 5).await.unwrap();
    let employee = store.add_employee("Ada", "Lovelace").await.unwrap();
    let window = store.add_workstation("Window 1", Some(employee)).await.unwrap();
    store.grant_employee(employee, "Passport").await.unwrap();
    store.grant_workstation(window, "Passport").await.unwrap();

    let config = QueueEngineConfig::default();
    let engine = Arc::new(QueueEngine::new(store.clone(), ChangeSignal::new(), &config));
    let push = PushChannel::new(config.general.push_channel.clone(), config.push.buffer);
    let router = create_router(ApiState::new(engine, store.clone(), push));

    TestApp { router, store, employee, window }
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_ticket_lifecycle_over_http() {
    let app = create_test_app().await;

    let (status, issued) = send(&app, "POST", "/api/v1/tickets", Some(json!({ "service_type": "Passport" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(issued["priority"], 5);
    let id = issued["ticket_id"].as_i64().unwrap();

    let (status, outcome) = send(
        &app,
        "POST",
        "/api/v1/call",
        Some(json!({ "employee_id": app.employee, "workstation_id": app.window })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "assigned");
    assert_eq!(outcome["ticket_id"], id);

    let (status, ticket) = send(&app, "GET", &format!("/api/v1/workstations/{}/ticket", app.window), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["status"], "called");

    let employee = json!({ "employee_id": app.employee });
    let (status, ticket) = send(&app, "POST", &format!("/api/v1/tickets/{}/confirm", id), Some(employee.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["status"], "confirmed");

    let (status, seated) = send(
        &app,
        "GET",
        &format!("/api/v1/workstations/{}/employee-status", app.window),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seated["status"], "serving");

    let (status, _) = send(&app, "POST", &format!("/api/v1/tickets/{}/quality", id), Some(json!({ "quality": 5 }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, archived) = send(&app, "POST", &format!("/api/v1/tickets/{}/complete", id), Some(employee)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(archived["ticket_id"], id);
    assert_eq!(archived["quality"], 5);

    let (_, log) = send(&app, "GET", "/api/v1/log", None).await;
    assert_eq!(log.as_array().unwrap().len(), 1);
    let (_, queue) = send(&app, "GET", "/api/v1/queue/all", None).await;
    assert!(queue.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_error_statuses() {
    let app = create_test_app().await;

    let (status, body) = send(&app, "POST", "/api/v1/tickets", Some(json!({ "service_type": "Fishing" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Fishing"));

    let (_, issued) = send(&app, "POST", "/api/v1/tickets", Some(json!({ "service_type": "Passport" }))).await;
    let id = issued["ticket_id"].as_i64().unwrap();

    let employee = json!({ "employee_id": app.employee });
    let (status, _) = send(&app, "POST", &format!("/api/v1/tickets/{}/confirm", id), Some(employee.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", "/api/v1/tickets/9999/complete", Some(employee)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", &format!("/api/v1/tickets/{}/quality", id), Some(json!({ "quality": 11 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "PUT", "/api/v1/employees/9999/status", Some(json!({ "status": "available" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_call_without_match() {
    let app = create_test_app().await;
    let (status, outcome) = send(
        &app,
        "POST",
        "/api/v1/call",
        Some(json!({ "employee_id": app.employee, "workstation_id": app.window })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({ "outcome": "no_match" }));
}

#[tokio::test]
async fn test_queue_resets() {
    let app = create_test_app().await;
    for _ in 0..3 {
        send(&app, "POST", "/api/v1/tickets", Some(json!({ "service_type": "Passport" }))).await;
    }

    let (_, public) = send(&app, "GET", "/api/v1/queue", None).await;
    assert_eq!(public.as_array().unwrap().len(), 3);

    let (status, removed) = send(&app, "DELETE", "/api/v1/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["removed"], 3);

    let (status, _) = send(&app, "POST", "/api/v1/queue/restart", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, issued) = send(&app, "POST", "/api/v1/tickets", Some(json!({ "service_type": "Passport" }))).await;
    assert_eq!(issued["ticket_id"], 1);
}

#[tokio::test]
async fn test_employee_status_endpoints() {
    let app = create_test_app().await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/v1/employees/{}/status", app.employee),
        Some(json!({ "status": "calling" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, all) = send(&app, "GET", "/api/v1/employees/status", None).await;
    assert_eq!(all[0]["status"], "calling");
    assert_eq!(all[0]["workstation_id"], app.window);

    let empty = app.store.add_workstation("Window 2", None).await.unwrap();
    let (status, _) = send(&app, "GET", &format!("/api/v1/workstations/{}/employee-status", empty), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_escalation_admin() {
    let app = create_test_app().await;

    let (status, tier) = send(
        &app,
        "POST",
        "/api/v1/escalation/tiers",
        Some(json!({ "threshold_secs": 600, "name": "Ten minutes" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tier["active"], true);
    let tier_id = tier["id"].as_i64().unwrap();

    let (status, toggled) = send(&app, "POST", &format!("/api/v1/escalation/tiers/{}/toggle", tier_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["active"], false);

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/v1/escalation/tiers/{}", tier_id),
        Some(json!({ "threshold_secs": 900, "name": "Fifteen minutes", "active": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["threshold_secs"], 900);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/escalation/recipients",
        Some(json!({ "email": "not-an-address", "tier_id": tier_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, recipient) = send(
        &app,
        "POST",
        "/api/v1/escalation/recipients",
        Some(json!({ "email": "lead@office.test", "tier_id": tier_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(recipient["email"], "lead@office.test");

    let (_, recipients) = send(&app, "GET", "/api/v1/escalation/recipients", None).await;
    assert_eq!(recipients.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/escalation/tiers/{}", tier_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, recipients) = send(&app, "GET", "/api/v1/escalation/recipients", None).await;
    assert!(recipients.as_array().unwrap().is_empty());

    let (status, _) = send(&app, "POST", &format!("/api/v1/escalation/tiers/{}/toggle", tier_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//! HTTP API tests, driven through the router with `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use lotkeeper_testing::helpers::init_tracing;
use lotkeeper_testing::{InMemoryLotStore, test_clock};
use lotkeeper_web::{AppState, BroadcastPublisher, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn app(store: &InMemoryLotStore) -> (Router, AppState) {
    init_tracing();
    let state = AppState::new(
        Arc::new(store.clone()),
        BroadcastPublisher::new(64),
        Arc::new(test_clock()),
        None,
    );
    (build_router(state.clone(), &["*".to_string()]), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app(&InMemoryLotStore::new());
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn three_space_scenario_over_http() {
    let (app, _) = app(&InMemoryLotStore::with_spaces(3, 0));

    for expected in 1..=3 {
        let (status, body) = send(&app, "POST", "/assignments", Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["space_id"], expected);
        assert_eq!(body["released_at"], Value::Null);
    }

    let (status, body) = send(&app, "POST", "/assignments", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "NO_FREE_SPACE");

    let (_, open) = send(&app, "GET", "/incidents?open=true&kind=lot_full", None).await;
    assert_eq!(open.as_array().unwrap().len(), 1);
    let (_, rejected) = send(&app, "GET", "/incidents?kind=request_rejected", None).await;
    let rejected = rejected.as_array().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["opened_at"], rejected[0]["resolved_at"]);

    let (status, body) = send(&app, "PUT", "/assignments/2/release", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "released");
    assert_eq!(body["assignment"]["space_id"], 2);

    let (status, body) = send(&app, "PUT", "/assignments/2/release", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_released");

    let (_, open) = send(&app, "GET", "/incidents?open=true&kind=lot_full", None).await;
    assert!(open.as_array().unwrap().is_empty());

    let (status, body) = send(&app, "POST", "/assignments", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["space_id"], 2);

    let (_, active) = send(&app, "GET", "/assignments/active", None).await;
    assert_eq!(active.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn reserved_requests_need_a_registered_holder() {
    let (app, _) = app(&InMemoryLotStore::with_spaces(1, 1));

    let (status, body) = send(
        &app,
        "POST",
        "/assignments",
        Some(json!({"holder": 12_345_678})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "UNKNOWN_HOLDER");

    let (status, body) = send(
        &app,
        "POST",
        "/holders",
        Some(json!({"key": 12_345_678, "name": "Juan Pérez"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Juan Pérez");

    let (status, body) = send(
        &app,
        "POST",
        "/assignments",
        Some(json!({"holder": 12_345_678})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["holder"], 12_345_678);
    assert_eq!(body["space_id"], 1);

    let (status, _) = send(&app, "GET", "/holders/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(
        &app,
        "PUT",
        "/holders/12345678",
        Some(json!({"name": "J. Pérez"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "J. Pérez");
    let (status, _) = send(&app, "DELETE", "/holders/12345678", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, holders) = send(&app, "GET", "/holders", None).await;
    assert!(holders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn space_administration() {
    let (app, _) = app(&InMemoryLotStore::with_spaces(1, 0));

    let (status, body) = send(&app, "POST", "/spaces", Some(json!({"label": "02"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["class"], "open");
    assert_eq!(body["state"], "free");

    let (status, body) = send(&app, "POST", "/spaces", Some(json!({"label": "02"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, body) = send(&app, "POST", "/spaces", Some(json!({"label": ""}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        "PUT",
        "/spaces/2/class",
        Some(json!({"class": "reserved"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["class"], "reserved");

    let (_, reserved) = send(&app, "GET", "/spaces?class=reserved", None).await;
    assert_eq!(reserved.as_array().unwrap().len(), 1);
    let (_, available) = send(&app, "GET", "/spaces/available", None).await;
    assert_eq!(available.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, "GET", "/spaces/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, "POST", "/assignments", Some(json!({}))).await;
    let (status, body) = send(
        &app,
        "PUT",
        "/spaces/1/class",
        Some(json!({"class": "reserved"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    let (_, space) = send(&app, "GET", "/spaces/1", None).await;
    assert_eq!(space["class"], "open");
}

#[tokio::test]
async fn browsers_from_configured_origins_pass_preflight() {
    let state = AppState::new(
        Arc::new(InMemoryLotStore::with_spaces(1, 0)),
        BroadcastPublisher::new(8),
        Arc::new(test_clock()),
        None,
    );
    let app = build_router(state, &["http://localhost:3000".to_string()]);

    let preflight = |origin: &str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/spaces")
            .header("origin", origin)
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(preflight("http://localhost:3000"))
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );

    let response = app
        .oneshot(preflight("https://elsewhere.example"))
        .await
        .unwrap();
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn any_origin_by_default() {
    let (app, _) = app(&InMemoryLotStore::new());
    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://kiosk.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn sensor_release_frees_the_space() {
    let (app, _) = app(&InMemoryLotStore::with_spaces(1, 0));
    send(&app, "POST", "/assignments", Some(json!({}))).await;

    let (status, body) = send(&app, "PUT", "/spaces/1/release", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "free");

    let (_, assignment) = send(&app, "GET", "/assignments/1", None).await;
    assert_ne!(assignment["released_at"], Value::Null);
}

#[tokio::test]
async fn staff_incidents() {
    let (app, _) = app(&InMemoryLotStore::with_spaces(1, 0));

    let (status, _) = send(&app, "POST", "/incidents", Some(json!({"kind": "lot_full"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, incident) = send(
        &app,
        "POST",
        "/incidents",
        Some(json!({"kind": "sensor_fault", "space_id": 1, "note": "sensor stuck"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(incident["resolved_at"], Value::Null);
    let id = incident["id"].as_i64().unwrap();

    let (status, resolved) = send(&app, "PUT", &format!("/incidents/{id}/resolve"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(resolved["resolved_at"], Value::Null);
    assert_eq!(resolved["note"], "sensor stuck");

    let (status, _) = send(&app, "PUT", &format!("/incidents/{id}/resolve"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&app, "GET", "/incidents/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn statistics_and_disabled_metrics() {
    let (app, _) = app(&InMemoryLotStore::with_spaces(3, 2));
    send(&app, "POST", "/assignments", Some(json!({}))).await;

    let (status, stats) = send(&app, "GET", "/reports/statistics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_spaces"], 5);
    assert_eq!(stats["occupied_spaces"], 1);
    assert_eq!(stats["active_assignments"], 1);

    let (status, _) = send(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let inverted = "from=2026-03-02T10:00:00Z&to=2026-03-02T09:00:00Z";
    let uri = format!("/reports/statistics?{inverted}");
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    let (status, _) = send(&app, "GET", &format!("/incidents?{inverted}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn committed_changes_reach_subscribers() {
    let (app, state) = app(&InMemoryLotStore::with_spaces(1, 0));
    let mut events = state.events.subscribe();

    send(&app, "POST", "/assignments", Some(json!({}))).await;

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    assert_eq!(names, ["space_updated", "assignment_created", "incident_opened"]);
}

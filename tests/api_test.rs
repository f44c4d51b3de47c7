use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use library_circulation::adapters::{FixedClock, InMemoryStore};
use library_circulation::api::{AppState, create_router};
use library_circulation::application::lending::LendingEngine;
use library_circulation::domain::LendingPolicy;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

mod common;

use common::{day, instant_retry};

// ============================================================================
// ヘルパー
// ============================================================================

struct TestApp {
    router: Router,
    clock: Arc<FixedClock>,
    store: InMemoryStore,
}

fn setup_app() -> TestApp {
    let store = InMemoryStore::new();
    let clock = Arc::new(FixedClock::new(day(0)));
    let engine = LendingEngine::new(Arc::new(store.clone()), LendingPolicy::default())
        .with_retry(instant_retry());

    let state = Arc::new(AppState {
        engine,
        clock: clock.clone(),
    });

    TestApp {
        router: create_router(state),
        clock,
        store,
    }
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
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn register(app: &TestApp, name: &str, role: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/members",
        Some(json!({ "name": name, "email": format!("{}@example.com", name), "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["member_id"].as_str().unwrap().to_string()
}

async fn catalog(app: &TestApp, catalog_number: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/items",
        Some(json!({
            "catalog_number": catalog_number,
            "title": "Vidas Secas",
            "author": "Graciliano Ramos",
            "pages": 176,
            "category": "Fiction"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["item_id"].as_str().unwrap().to_string()
}

async fn borrow(app: &TestApp, item_id: &str, member_id: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/loans",
        Some(json!({ "item_id": item_id, "member_id": member_id })),
    )
    .await
}

// ============================================================================
// テスト
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = setup_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_loan_lifecycle_over_http() {
    let app = setup_app();
    let member_id = register(&app, "ana", "member").await;
    let item_id = catalog(&app, "978-85-01-00123-4").await;

    let (status, loan) = borrow(&app, &item_id, &member_id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["status"], "active");
    assert_eq!(loan["events"][0]["type"], "ItemBorrowed");
    let loan_id = loan["loan_id"].as_str().unwrap().to_string();

    let (_, availability) = send(&app, "GET", &format!("/items/{}/availability", item_id), None).await;
    assert_eq!(availability["available"], false);

    // 6日延滞して返却
    app.clock.advance(Duration::days(20));
    let (status, returned) = send(&app, "POST", &format!("/loans/{}/return", loan_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "fined");
    assert_eq!(returned["fine"]["amount"], "6.00");
    assert_eq!(returned["fine"]["paid"], false);

    let (_, fines) = send(&app, "GET", &format!("/members/{}/fines", member_id), None).await;
    assert_eq!(fines.as_array().unwrap().len(), 1);

    let (status, paid) = send(&app, "POST", &format!("/loans/{}/pay-fine", loan_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "closed");
    assert_eq!(paid["fine"]["paid"], true);

    let (status, fine) = send(&app, "GET", &format!("/loans/{}/fine", loan_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fine["amount"], "6.00");

    let (_, availability) = send(&app, "GET", &format!("/items/{}/availability", item_id), None).await;
    assert_eq!(availability["available"], true);
}

#[tokio::test]
async fn test_renew_returns_new_due_date() {
    let app = setup_app();
    let member_id = register(&app, "ana", "member").await;
    let item_id = catalog(&app, "978-85-01-00999-5").await;
    let (_, loan) = borrow(&app, &item_id, &member_id).await;
    let loan_id = loan["loan_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "POST", &format!("/loans/{}/renew", loan_id), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "TOO_EARLY");

    app.clock.set(day(13));
    let (status, body) = send(&app, "POST", &format!("/loans/{}/renew", loan_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["renewal_count"], 1);
    assert_eq!(body["events"][0]["type"], "LoanRenewed");

    let (_, details) = send(&app, "GET", &format!("/loans/{}", loan_id), None).await;
    let due: chrono::DateTime<chrono::Utc> = serde_json::from_value(details["due_date"].clone()).unwrap();
    assert_eq!(due, day(28));
}

#[tokio::test]
async fn test_business_rule_failures_map_to_status_codes() {
    let app = setup_app();
    let ana = register(&app, "ana", "member").await;
    let bruno = register(&app, "bruno", "member").await;
    let clara = register(&app, "clara", "librarian").await;
    let item_id = catalog(&app, "978-85-01-00777-1").await;

    let (status, body) = borrow(&app, &item_id, &clara).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "NOT_ELIGIBLE");

    let (status, _) = borrow(&app, &item_id, &ana).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = borrow(&app, &item_id, &bruno).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ALREADY_ON_LOAN");

    let (status, body) = send(&app, "DELETE", &format!("/items/{}", item_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ITEM_ON_LOAN");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/loans/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_reservation_queue_over_http() {
    let app = setup_app();
    let ana = register(&app, "ana", "member").await;
    let bruno = register(&app, "bruno", "member").await;
    let carla = register(&app, "carla", "member").await;
    let item_id = catalog(&app, "978-85-01-00555-3").await;

    let (_, loan) = borrow(&app, &item_id, &ana).await;
    let loan_id = loan["loan_id"].as_str().unwrap().to_string();

    app.clock.set(day(1));
    let (status, reservation) = send(
        &app,
        "POST",
        "/reservations",
        Some(json!({ "item_id": item_id, "member_id": bruno })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["status"], "waiting");

    let (status, body) = send(
        &app,
        "POST",
        "/reservations",
        Some(json!({ "item_id": item_id, "member_id": bruno })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ALREADY_RESERVED");

    let (_, queue) = send(&app, "GET", &format!("/items/{}/queue", item_id), None).await;
    assert_eq!(queue.as_array().unwrap().len(), 1);

    app.clock.set(day(2));
    send(&app, "POST", &format!("/loans/{}/return", loan_id), None).await;

    let (status, body) = borrow(&app, &item_id, &carla).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "QUEUE_VIOLATION");

    let (status, body) = borrow(&app, &item_id, &bruno).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["events"][1]["type"], "ReservationFulfilled");
}

#[tokio::test]
async fn test_cancel_reservation_twice_is_invalid_transition() {
    let app = setup_app();
    let ana = register(&app, "ana", "member").await;
    let bruno = register(&app, "bruno", "member").await;
    let item_id = catalog(&app, "978-85-01-00444-8").await;
    borrow(&app, &item_id, &ana).await;

    let (_, reservation) = send(
        &app,
        "POST",
        "/reservations",
        Some(json!({ "item_id": item_id, "member_id": bruno })),
    )
    .await;
    let uri = format!(
        "/reservations/{}/cancel",
        reservation["reservation_id"].as_str().unwrap()
    );

    let (status, body) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_catalog_management_over_http() {
    let app = setup_app();
    let item_id = catalog(&app, "978-85-01-00333-2").await;

    let (status, body) = send(
        &app,
        "POST",
        "/items",
        Some(json!({
            "catalog_number": "9788501003332",
            "title": "Duplicate",
            "author": "Someone",
            "pages": 1,
            "category": "Fiction",
            "url": "https://example.com/book.epub"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DUPLICATE_CATALOG_NUMBER");

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/items/{}", item_id),
        Some(json!({ "title": "Vidas Secas (ed. comemorativa)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Vidas Secas (ed. comemorativa)");
    assert_eq!(body["author"], "Graciliano Ramos");
    assert_eq!(body["format"], "physical");

    let (status, _) = send(&app, "DELETE", &format!("/items/{}", item_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_persistent_contention_maps_to_service_unavailable() {
    let app = setup_app();
    let ana = register(&app, "ana", "member").await;
    let item_id = catalog(&app, "978-85-01-00222-7").await;

    app.store.inject_contention(3);
    let (status, body) = borrow(&app, &item_id, &ana).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "BUSY");
}

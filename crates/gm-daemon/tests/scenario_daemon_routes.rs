//! In-process scenario tests for gm-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test builds the router over an in-memory repository and a scripted
//! accrual source and drives it via `tower::ServiceExt::oneshot`.
//!
//! # Invariants under test
//!
//! 1. Submission maps every outcome to its status code: 202, 200, 400, 422,
//!    409, 503 (+ `Retry-After`), 500.
//! 2. Requests without a valid `X-User-Id` are 401.
//! 3. Empty listings are 204; non-empty ones carry the wire status names.
//! 4. Withdrawal maps to 200, 402, 400, 422, and balance reflects the result.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use gm_core::{Accrual, Info, Order, SourceError, Status, UserId};
use gm_daemon::{routes, state};
use gm_service::OrderService;
use gm_testkit::{valid_number, InMemoryOrderRepository, ScriptedAccrualSource};
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    repo: Arc<InMemoryOrderRepository>,
    source: Arc<ScriptedAccrualSource>,
    router: axum::Router,
}

fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryOrderRepository::new());
    let source = Arc::new(ScriptedAccrualSource::new());
    let service = Arc::new(OrderService::new(repo.clone(), source.clone()));
    let router = routes::build_router(Arc::new(state::AppState::new(service)));
    Fixture {
        repo,
        source,
        router,
    }
}

/// Drive the router with a single request and return (status, headers, body_bytes).
async fn call(
    router: &axum::Router,
    req: Request<Body>,
) -> (StatusCode, axum::http::HeaderMap, bytes::Bytes) {
    let resp = router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, headers, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn post_order(user: UserId, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/user/orders")
        .header(routes::USER_ID_HEADER, user.to_string())
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(user: UserId, uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(routes::USER_ID_HEADER, user.to_string())
        .body(Body::empty())
        .unwrap()
}

fn post_withdraw(user: UserId, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/user/balance/withdraw")
        .header(routes::USER_ID_HEADER, user.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn processed(user: UserId, payload: u64, units: i64) -> Order {
    Order::new(
        user,
        Info::new(
            valid_number(payload),
            Status::Processed,
            Some(Accrual::from_units(units)),
        ),
    )
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let f = fixture();
    let req = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = call(&f.router, req).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "gm-daemon");
}

// ---------------------------------------------------------------------------
// POST /api/user/orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_new_then_duplicate_then_foreign() {
    let f = fixture();
    let (alice, bob) = (UserId::new(), UserId::new());

    let (status, _, _) = call(&f.router, post_order(alice, "79927398713")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _, _) = call(&f.router, post_order(alice, "79927398713")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = call(&f.router, post_order(bob, "79927398713")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse_json(body)["kind"], "conflict");

    assert_eq!(f.repo.snapshot().len(), 1);
}

#[tokio::test]
async fn submit_validation_codes() {
    let f = fixture();
    let user = UserId::new();

    let (status, _, _) = call(&f.router, post_order(user, "not-a-number")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = call(&f.router, post_order(user, "79927398714")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert!(f.source.calls().is_empty());
}

#[tokio::test]
async fn submit_while_source_rate_limits_is_503_with_retry_after() {
    let f = fixture();
    f.source
        .fail(valid_number(7_992_739_871), SourceError::rate_limited(30));

    let (status, headers, _) = call(&f.router, post_order(UserId::new(), "79927398713")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "30");
}

#[tokio::test]
async fn submit_with_storage_down_is_500_without_details() {
    let f = fixture();
    f.repo.set_fail_writes(true);

    let (status, _, body) = call(&f.router, post_order(UserId::new(), "79927398713")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json = parse_json(body);
    assert_eq!(json["kind"], "internal");
    assert!(!json["error"].as_str().unwrap().contains("injected"));
}

#[tokio::test]
async fn missing_or_bad_identity_is_401() {
    let f = fixture();

    let req = Request::builder()
        .method("GET")
        .uri("/api/user/balance")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = call(&f.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("GET")
        .uri("/api/user/balance")
        .header(routes::USER_ID_HEADER, "alice")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = call(&f.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// GET /api/user/orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_listing_is_204_when_empty_and_wire_named_otherwise() {
    let f = fixture();
    let user = UserId::new();

    let (status, _, _) = call(&f.router, get(user, "/api/user/orders")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    f.repo.seed(processed(user, 7_992_739_871, 5));
    let (status, _, body) = call(&f.router, get(user, "/api/user/orders")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json[0]["number"], "79927398713");
    assert_eq!(json[0]["status"], "PROCESSED");
    assert_eq!(json[0]["accrual"], 5.0);
}

// ---------------------------------------------------------------------------
// Balance and withdrawals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn withdraw_boundary_and_balance() {
    let f = fixture();
    let user = UserId::new();
    f.repo.seed(processed(user, 1, 100));

    let (status, _, body) = call(
        &f.router,
        post_withdraw(user, r#"{"order":"79927398713","sum":100.01}"#),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(parse_json(body)["kind"], "insufficient_funds");

    let (status, _, _) = call(
        &f.router,
        post_withdraw(user, r#"{"order":"79927398713","sum":100}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = call(&f.router, get(user, "/api/user/balance")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["current"], 0.0);
    assert_eq!(json["withdrawn"], 100.0);

    let (status, _, body) = call(&f.router, get(user, "/api/user/withdrawals")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json[0]["order"], "79927398713");
    assert_eq!(json[0]["sum"], 100.0);
}

#[tokio::test]
async fn withdraw_validation_codes() {
    let f = fixture();
    let user = UserId::new();
    f.repo.seed(processed(user, 1, 100));

    let cases = [
        (r#"{"order":"79927398713""#, StatusCode::BAD_REQUEST),
        (r#"{"order":"abc","sum":1}"#, StatusCode::BAD_REQUEST),
        (r#"{"order":"79927398714","sum":1}"#, StatusCode::UNPROCESSABLE_ENTITY),
        (r#"{"order":"79927398713","sum":0}"#, StatusCode::UNPROCESSABLE_ENTITY),
        (r#"{"order":"79927398713","sum":1.005}"#, StatusCode::UNPROCESSABLE_ENTITY),
    ];
    for (json, expected) in cases {
        let (status, _, _) = call(&f.router, post_withdraw(user, json)).await;
        assert_eq!(status, expected, "{json}");
    }

    let (status, _, _) = call(&f.router, get(user, "/api/user/withdrawals")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

//! Direct payment creation, listings, manual status changes and checkout.

mod common;

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    routing::post,
};
use common::*;
use serde_json::{Value, json};

async fn create_direct(ctx: &TestContext, token: &str, body: Value) -> (StatusCode, Value) {
    send(&ctx.app, request("POST", "/mp/payments", Some(token), Some(body))).await
}

#[tokio::test]
async fn test_direct_creation_keeps_amount() {
    let ctx = test_context();
    let (_, admin) = user_with_token(&ctx.state, "boss", UserRole::Admin);

    let (status, body) = create_direct(
        &ctx,
        &admin,
        json!({
            "payment_id": "9001",
            "user_id": 42,
            "curso_id": 7,
            "status": "approved",
            "amount": 1500.5,
            "payment_method": "account_money",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["amount"], 1500.5);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["payment_id"], "9001");
    assert_eq!(body["user_id"], 42);
    assert_eq!(body["curso_id"], 7);
    assert!(body.get("provider_payment_id").is_none());
    assert!(body.get("linkage").is_none());

    let stored = get_payment(&ctx.state, "9001").unwrap();
    assert_eq!(stored.amount, 1500.5);
    assert_eq!(ctx.activation.approved_ids(), vec!["9001".to_string()]);

    // Notifications never carry an amount
    send_raw(&ctx.app, request("GET", "/mp/success?payment_id=9002", None, None)).await;
    assert_eq!(get_payment(&ctx.state, "9002").unwrap().amount, 0.0);
}

#[tokio::test]
async fn test_direct_creation_duplicate_is_conflict() {
    let ctx = test_context();
    let (_, admin) = user_with_token(&ctx.state, "boss", UserRole::Admin);
    let body = json!({"payment_id": "9003", "status": "pending", "amount": 10.0});

    let (status, _) = create_direct(&ctx, &admin, body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, response) = create_direct(&ctx, &admin, body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["error"], "Conflict");
    assert_eq!(payment_count(&ctx.state, "9003"), 1);
}

#[tokio::test]
async fn test_direct_creation_validation() {
    let ctx = test_context();
    let (_, admin) = user_with_token(&ctx.state, "boss", UserRole::Admin);

    let cases = [
        json!({"payment_id": "", "status": "approved", "amount": 1.0}),
        json!({"payment_id": "9004", "status": "refunded", "amount": 1.0}),
        json!({"payment_id": "9004", "status": "approved", "amount": -1.0}),
        json!({"payment_id": "9004", "status": "approved", "amount": 1.0, "user_id": 3}),
    ];
    for body in cases {
        let (status, _) = create_direct(&ctx, &admin, body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
    }
    assert_eq!(payment_count(&ctx.state, "9004"), 0);
}

// ============ Listings ============

fn seed_payments(ctx: &TestContext, ana_id: i64, bea_id: i64) {
    let conn = ctx.state.db.get().unwrap();
    let rows = [
        ("p-1", ana_id, 1, PaymentStatus::Approved),
        ("p-2", ana_id, 2, PaymentStatus::Pending),
        ("p-3", bea_id, 1, PaymentStatus::Approved),
        ("p-4", bea_id, 3, PaymentStatus::Rejected),
    ];
    for (id, user_id, course_id, status) in rows {
        queries::create_payment(
            &conn,
            &NewPayment {
                provider_payment_id: id.to_string(),
                external_reference: None,
                linkage: Some(PaymentLinkage { user_id, course_id }),
                status,
                amount: 100.0,
                payment_method: None,
                merchant_order_id: None,
                raw_payload: None,
            },
        )
        .unwrap();
    }
}

fn provider_ids(body: &Value) -> Vec<String> {
    let mut ids: Vec<String> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["payment_id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_admin_lists_with_filters() {
    let ctx = test_context();
    let (_, admin) = user_with_token(&ctx.state, "boss", UserRole::Admin);
    let ana = create_test_user(&ctx.state, "ana", UserRole::User);
    let bea = create_test_user(&ctx.state, "bea", UserRole::User);
    seed_payments(&ctx, ana.id, bea.id);

    let list = |query: String| request("GET", &format!("/userpayments/user_payments{}", query), Some(&admin), None);

    let (status, body) = send(&ctx.app, list(String::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(provider_ids(&body), vec!["p-1", "p-2", "p-3", "p-4"]);

    let (_, body) = send(&ctx.app, list(format!("?user_id={}", bea.id))).await;
    assert_eq!(provider_ids(&body), vec!["p-3", "p-4"]);

    let (_, body) = send(&ctx.app, list("?status=approved".to_string())).await;
    assert_eq!(provider_ids(&body), vec!["p-1", "p-3"]);

    let (_, body) = send(&ctx.app, list(format!("?user_id={}&curso_id=1", ana.id))).await;
    assert_eq!(provider_ids(&body), vec!["p-1"]);

    let (status, body) = send(&ctx.app, list("?status=refunded".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationFailure");
}

#[tokio::test]
async fn test_user_listing_is_scoped_to_self() {
    let ctx = test_context();
    let (ana, token) = user_with_token(&ctx.state, "ana", UserRole::User);
    let bea = create_test_user(&ctx.state, "bea", UserRole::User);
    seed_payments(&ctx, ana.id, bea.id);

    let (status, body) = send(
        &ctx.app,
        request(
            "GET",
            &format!("/userpayments/user_payments?user_id={}", bea.id),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(provider_ids(&body), vec!["p-1", "p-2"]);

    let (status, _) = send(
        &ctx.app,
        request("GET", "/userpayments/user_payments", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============ Manual status changes ============

#[tokio::test]
async fn test_admin_updates_status() {
    let ctx = test_context();
    let (_, admin) = user_with_token(&ctx.state, "boss", UserRole::Admin);
    send_raw(&ctx.app, request("GET", "/mp/pending?payment_id=9100", None, None)).await;
    let payment = get_payment(&ctx.state, "9100").unwrap();
    let uri = format!("/userpayments/{}/status", payment.id);

    let (status, body) = send(
        &ctx.app,
        request("PATCH", &uri, Some(&admin), Some(json!({"status": "approved"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(ctx.activation.approved_ids(), vec!["9100".to_string()]);

    // Already approved: no second activation
    send(
        &ctx.app,
        request("PATCH", &uri, Some(&admin), Some(json!({"status": "approved"}))),
    )
    .await;
    assert_eq!(ctx.activation.approved_ids().len(), 1);

    let (status, _) = send(
        &ctx.app,
        request("PATCH", &uri, Some(&admin), Some(json!({"status": "cancelled"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(get_payment(&ctx.state, "9100").unwrap().status, PaymentStatus::Approved);

    let (status, _) = send(
        &ctx.app,
        request(
            "PATCH",
            "/userpayments/99999/status",
            Some(&admin),
            Some(json!({"status": "rejected"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_cannot_update_status() {
    let ctx = test_context();
    let (_, token) = user_with_token(&ctx.state, "ana", UserRole::User);
    send_raw(&ctx.app, request("GET", "/mp/pending?payment_id=9101", None, None)).await;
    let payment = get_payment(&ctx.state, "9101").unwrap();

    let (status, _) = send(
        &ctx.app,
        request(
            "PATCH",
            &format!("/userpayments/{}/status", payment.id),
            Some(&token),
            Some(json!({"status": "approved"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(get_payment(&ctx.state, "9101").unwrap().status, PaymentStatus::Pending);
}

// ============ Checkout against a mock gateway ============

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<(Option<String>, Value)>>>);

async fn mock_preferences(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    captured.0.lock().unwrap().push((auth, body));
    Json(json!({
        "id": "pref-123",
        "init_point": "https://mp.test/checkout?pref_id=pref-123",
        "sandbox_init_point": "https://sandbox.mp.test/checkout?pref_id=pref-123",
    }))
}

async fn mock_failure() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"message": "invalid access token"})),
    )
}

/// Serve a fake provider API on an ephemeral port and return its base URL.
async fn spawn_gateway(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn gateway_context() -> (TestContext, Captured) {
    let captured = Captured::default();
    let gateway = spawn_gateway(
        Router::new()
            .route("/checkout/preferences", post(mock_preferences))
            .with_state(captured.clone()),
    )
    .await;
    (build_context(setup_test_pool(), &gateway, None), captured)
}

fn preference_body(user_id: i64) -> Value {
    json!({
        "username": "ana",
        "email": "ana@example.com",
        "curso_titulo": "Rust desde cero",
        "precio": 2500.0,
        "cantidad": 1,
        "user_id": user_id,
        "curso_id": 7,
    })
}

#[tokio::test]
async fn test_create_preference_sends_reference_and_urls() {
    let (ctx, captured) = gateway_context().await;

    let (status, body) = send(
        &ctx.app,
        request("POST", "/mp/create_preference", None, Some(preference_body(42))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "pref-123");
    assert!(body["init_point"].as_str().unwrap().contains("pref-123"));

    let calls = captured.0.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (auth, sent) = &calls[0];
    assert_eq!(auth.as_deref(), Some("Bearer TEST-access-token"));
    assert_eq!(sent["external_reference"], "42_7");
    assert_eq!(sent["notification_url"], format!("{}/mp/webhook", BASE_URL));
    assert_eq!(sent["back_urls"]["success"], format!("{}/mp/success", BASE_URL));
    assert_eq!(sent["back_urls"]["failure"], format!("{}/mp/failure", BASE_URL));
    assert_eq!(sent["back_urls"]["pending"], format!("{}/mp/pending", BASE_URL));
    assert_eq!(sent["auto_return"], "approved");
    assert_eq!(sent["items"][0]["unit_price"], 2500.0);
    assert_eq!(sent["items"][0]["currency_id"], "ARS");
    assert_eq!(sent["payer"]["email"], "ana@example.com");

    // Creating a preference stores nothing
    let conn = ctx.state.db.get().unwrap();
    assert!(queries::list_payments(&conn, None, None, None).unwrap().is_empty());
}

#[tokio::test]
async fn test_create_preference_validation() {
    let (ctx, captured) = gateway_context().await;

    let mut body = preference_body(42);
    body["precio"] = json!(0);
    let (status, _) = send(&ctx.app, request("POST", "/mp/create_preference", None, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = preference_body(42);
    body["cantidad"] = json!(0);
    let (status, _) = send(&ctx.app, request("POST", "/mp/create_preference", None, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(captured.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_preference_gateway_down_is_upstream_failure() {
    let ctx = test_context();

    let (status, body) = send(
        &ctx.app,
        request("POST", "/mp/create_preference", None, Some(preference_body(42))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "UpstreamFailure");
}

#[tokio::test]
async fn test_create_preference_gateway_error_is_upstream_failure() {
    let gateway = spawn_gateway(Router::new().route("/checkout/preferences", post(mock_failure))).await;
    let ctx = build_context(setup_test_pool(), &gateway, None);

    let (status, body) = send(
        &ctx.app,
        request("POST", "/mp/create_preference", None, Some(preference_body(42))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "UpstreamFailure");
}

#[tokio::test]
async fn test_checkout_registers_and_links_new_user() {
    let (ctx, captured) = gateway_context().await;

    let (status, body) = send(
        &ctx.app,
        request(
            "POST",
            "/mp/checkout",
            None,
            Some(json!({
                "username": "nuevo",
                "email": "nuevo@example.com",
                "password": TEST_PASSWORD,
                "curso_titulo": "Rust desde cero",
                "precio": 2500.0,
                "cantidad": 1,
                "curso_id": 7,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "pref-123");
    assert_eq!(body["user"]["username"], "nuevo");
    assert_eq!(body["user"]["role"], "user");

    let user_id = body["user"]["id"].as_i64().unwrap();
    let calls = captured.0.lock().unwrap().clone();
    assert_eq!(calls[0].1["external_reference"], format!("{}_7", user_id));

    // Duplicate registration stops before the gateway
    let (status, _) = send(
        &ctx.app,
        request(
            "POST",
            "/mp/checkout",
            None,
            Some(json!({
                "username": "nuevo",
                "email": "nuevo@example.com",
                "password": TEST_PASSWORD,
                "curso_titulo": "Rust desde cero",
                "precio": 2500.0,
                "cantidad": 1,
                "curso_id": 7,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(captured.0.lock().unwrap().len(), 1);
}

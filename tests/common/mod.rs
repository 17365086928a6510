//! Test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::Value;
use tower::ServiceExt;

pub use cursos::activation::CourseActivation;
pub use cursos::crypto::hash_password;
pub use cursos::db::{AppState, DbPool, create_memory_pool, init_db, queries};
pub use cursos::handlers;
pub use cursos::jwt::TokenService;
pub use cursos::models::*;
pub use cursos::payments::MercadoPagoClient;

pub const TEST_PASSWORD: &str = "password123";
pub const TEST_JWT_SECRET: &[u8] = b"test-secret-test-secret-test-sec";
pub const FRONTEND_URL: &str = "http://localhost:5173";
pub const BASE_URL: &str = "http://api.test";
/// Nothing listens here, so gateway calls fail fast.
pub const UNREACHABLE_GATEWAY: &str = "http://127.0.0.1:9";

/// Activation hook that remembers which payments it saw.
#[derive(Default)]
pub struct RecordingActivation {
    pub approved: Mutex<Vec<String>>,
}

impl RecordingActivation {
    pub fn approved_ids(&self) -> Vec<String> {
        self.approved.lock().unwrap().clone()
    }
}

impl CourseActivation for RecordingActivation {
    fn payment_approved(&self, payment: &Payment) {
        self.approved
            .lock()
            .unwrap()
            .push(payment.provider_payment_id.clone());
    }
}

pub struct TestContext {
    pub state: AppState,
    pub app: Router,
    pub activation: Arc<RecordingActivation>,
}

/// Fresh shared-cache in-memory pool with the schema applied.
pub fn setup_test_pool() -> DbPool {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let pool = create_memory_pool(&format!("cursos_test_{}_{}", std::process::id(), n))
        .expect("Failed to create test pool");
    {
        let mut conn = pool.get().unwrap();
        init_db(&mut conn).expect("Failed to initialize schema");
    }
    pool
}

pub fn build_context(pool: DbPool, gateway_url: &str, webhook_secret: Option<&str>) -> TestContext {
    let activation = Arc::new(RecordingActivation::default());
    let state = AppState {
        db: pool,
        app_name: "API de Cursos".to_string(),
        base_url: BASE_URL.to_string(),
        frontend_url: FRONTEND_URL.to_string(),
        tokens: TokenService::new(TEST_JWT_SECRET),
        mercadopago: MercadoPagoClient::new(
            "TEST-access-token",
            gateway_url,
            BASE_URL,
            webhook_secret.map(String::from),
        ),
        activation: activation.clone(),
    };
    let app = handlers::router(state.clone());
    TestContext {
        state,
        app,
        activation,
    }
}

pub fn test_context() -> TestContext {
    build_context(setup_test_pool(), UNREACHABLE_GATEWAY, None)
}

/// Argon2 is slow on purpose; hash the shared test password once.
fn test_password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(TEST_PASSWORD).unwrap())
}

pub fn create_test_user(state: &AppState, username: &str, role: UserRole) -> User {
    let conn = state.db.get().unwrap();
    queries::create_user(
        &conn,
        username,
        &format!("{}@example.com", username),
        test_password_hash(),
        role,
    )
    .expect("Failed to create test user")
}

pub fn token_for(state: &AppState, user: &User) -> String {
    state.tokens.issue(user.id).unwrap()
}

/// A user of the given role plus a valid bearer token.
pub fn user_with_token(state: &AppState, username: &str, role: UserRole) -> (User, String) {
    let user = create_test_user(state, username, role);
    let token = token_for(state, &user);
    (user, token)
}

pub fn get_payment(state: &AppState, provider_payment_id: &str) -> Option<Payment> {
    let conn = state.db.get().unwrap();
    queries::get_payment_by_provider_id(&conn, provider_payment_id).unwrap()
}

pub fn payment_count(state: &AppState, provider_payment_id: &str) -> i64 {
    let conn = state.db.get().unwrap();
    queries::count_payments_by_provider_id(&conn, provider_payment_id).unwrap()
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send_raw(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

/// Send a request and decode the JSON body (`Value::Null` when empty).
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = send_raw(app, req).await;
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

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

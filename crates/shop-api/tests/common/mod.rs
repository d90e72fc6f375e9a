#![allow(dead_code)]

use axum::http::{header::SET_COOKIE, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use shop_api::{create_router, AppConfig, AppState};
use shop_core::{
    Currency, InMemoryStore, OutboxMailer, Product, Role, StaticIdentityProvider,
};
use shop_stripe::{webhook, StripeCheckoutGateway, StripeConfig};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const SESSION_ID: &str = "cs_test_flow";

pub struct TestApp {
    pub server: TestServer,
    pub stripe: MockServer,
    pub store: Arc<InMemoryStore>,
    pub mailer: Arc<OutboxMailer>,
}

pub async fn spawn_app() -> TestApp {
    let stripe = MockServer::start().await;

    let store = Arc::new(InMemoryStore::new());
    store.seed_products(vec![
        Product::new("mug", "Mug", Decimal::new(1250, 2), Currency::USD),
        Product::new("poster", "Poster", Decimal::new(800, 2), Currency::USD),
    ]);

    let gateway = StripeCheckoutGateway::new(
        StripeConfig::new("sk_test_integration", "pk_test_integration", WEBHOOK_SECRET)
            .with_api_base_url(stripe.uri()),
    )
    .unwrap();

    let identity = StaticIdentityProvider::default()
        .with_user("alice", "alice@example.com", "alice-pw", Role::Customer)
        .with_user("bob", "bob@example.com", "bob-pw", Role::Customer)
        .with_user("admin", "admin@example.com", "admin-pw", Role::Admin);

    let mailer = Arc::new(OutboxMailer::new());

    let state = AppState::new(
        AppConfig::for_tests("http://localhost:8080"),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(gateway),
        Arc::new(identity),
        mailer.clone(),
    )
    .unwrap();

    TestApp {
        server: TestServer::new(create_router(state)).unwrap(),
        stripe,
        store,
        mailer,
    }
}

impl TestApp {
    /// Log in and return the `Cookie` header value for the session
    pub async fn login(&self, email: &str, password: &str) -> HeaderValue {
        let response = self
            .server
            .post("/auth/login")
            .json(&json!({ "email": email, "password": password }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        session_pair(response.headers().get(SET_COOKIE).unwrap())
    }

    /// Stripe answers session creation with `SESSION_ID`
    pub async fn mock_stripe_session(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": SESSION_ID,
                "url": format!("https://checkout.stripe.test/{SESSION_ID}"),
            })))
            .mount(&self.stripe)
            .await;
    }

    pub async fn mock_stripe_retrieve(&self, payment_status: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/checkout/sessions/{SESSION_ID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": SESSION_ID,
                "payment_status": payment_status,
                "customer_details": { "email": "alice@example.com" },
            })))
            .mount(&self.stripe)
            .await;
    }

    pub async fn add_to_cart(&self, cookie: &HeaderValue, product_id: &str, quantity: u32) -> Value {
        let response = self
            .server
            .post("/api/v1/cart/items")
            .add_header(axum::http::header::COOKIE, cookie.clone())
            .json(&json!({ "product_id": product_id, "quantity": quantity }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        response.json::<Value>()
    }
}

/// `name=value` part of a `Set-Cookie` header, usable as a `Cookie` header
pub fn session_pair(set_cookie: &HeaderValue) -> HeaderValue {
    let pair = set_cookie
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    HeaderValue::from_str(&pair).unwrap()
}

/// A signed `checkout.session.*` webhook for `SESSION_ID`
pub fn signed_event(event_type: &str, payment_status: &str) -> (Vec<u8>, String) {
    let now = Utc::now().timestamp();
    let payload = serde_json::to_vec(&json!({
        "id": format!("evt_{event_type}"),
        "type": event_type,
        "created": now,
        "data": { "object": {
            "id": SESSION_ID,
            "payment_status": payment_status,
            "payment_intent": "pi_integration",
            "customer_details": { "email": "alice@example.com" }
        }}
    }))
    .unwrap();
    let signature = webhook::signature_header(WEBHOOK_SECRET, now, &payload).unwrap();
    (payload, signature)
}

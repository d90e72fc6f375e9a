mod common;

use axum::http::{
    header::{COOKIE, LOCATION, SET_COOKIE},
    HeaderValue, StatusCode,
};
use chrono::{Duration, Utc};
use common::spawn_app;
use serde_json::{json, Value};
use shop_api::AppConfig;
use shop_core::Role;

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;

    let response = app.server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "healthy");
}

#[tokio::test]
async fn test_login_sets_hardened_cookie() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/auth/login")
        .json(&json!({ "email": "alice@example.com", "password": "alice-pw" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["user_id"], "alice");
    assert_eq!(body["role"], "customer");

    let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("storefront_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/auth/login")
        .json(&json!({ "email": "alice@example.com", "password": "nope" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_session_requires_cookie() {
    let app = spawn_app().await;

    let response = app.server.get("/auth/session").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], 401);
}

#[tokio::test]
async fn test_session_is_refreshed() {
    let app = spawn_app().await;
    let cookie = app.login("alice@example.com", "alice-pw").await;

    let response = app.server.get("/auth/session").add_header(COOKIE, cookie).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["sub"], "alice");
    let refreshed = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(refreshed.starts_with("storefront_session="));
}

#[tokio::test]
async fn test_tampered_cookie_rejected() {
    let app = spawn_app().await;
    let cookie = app.login("alice@example.com", "alice-pw").await;

    // Swap one signature character away from the end
    let mut tampered: Vec<char> = cookie.to_str().unwrap().chars().collect();
    let at = tampered.len() - 5;
    tampered[at] = if tampered[at] == 'A' { 'Q' } else { 'A' };
    let tampered: String = tampered.into_iter().collect();

    let response = app
        .server
        .get("/api/v1/cart")
        .add_header(COOKIE, HeaderValue::from_str(&tampered).unwrap())
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_expired_cookie_behaves_like_no_cookie() {
    let app = spawn_app().await;
    let authority = AppConfig::for_tests("http://localhost:8080")
        .session_authority()
        .unwrap();

    let fresh = authority.issue("alice", Role::Customer).unwrap();
    let fresh = HeaderValue::from_str(&format!("storefront_session={}", fresh.value)).unwrap();
    let response = app.server.get("/auth/session").add_header(COOKIE, fresh).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let stale = authority
        .issue_at("alice", Role::Customer, Utc::now() - Duration::hours(25))
        .unwrap();
    let stale = HeaderValue::from_str(&format!("storefront_session={}", stale.value)).unwrap();

    let response = app.server.get("/auth/session").add_header(COOKIE, stale.clone()).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SET_COOKIE).is_none());

    let response = app.server.get("/api/v1/cart").add_header(COOKIE, stale.clone()).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = app.server.post("/checkout").add_header(COOKIE, stale).await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).unwrap(),
        "/checkout/error?reason=unauthenticated"
    );
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = spawn_app().await;

    let response = app.server.post("/auth/logout").await;

    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let cleared = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));
}

//! # Session Cookie Handling
//!
//! The session token lives in an `HttpOnly` cookie. A middleware verifies and
//! refreshes it on every request and stores the claims in the request
//! extensions, where the [`CurrentUser`] and [`MaybeUser`] extractors pick
//! them up. A missing, tampered or expired cookie all look the same: no claims.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use shop_core::{CheckoutError, SessionClaims};
use std::convert::Infallible;
use tracing::debug;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "storefront_session";

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(token: &str, ttl: Duration) -> String {
    format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        ttl.num_seconds()
    )
}

/// `Set-Cookie` value removing the session cookie
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0")
}

/// Value of a cookie from the request's `Cookie` headers
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn sets_session_cookie(response: &Response) -> bool {
    let prefix = format!("{SESSION_COOKIE}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&prefix))
}

/// Verify and refresh the session cookie on every request.
///
/// A valid token is re-issued with a fresh expiry unless the handler set
/// the cookie itself (login, logout).
pub async fn refresh_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let refreshed = read_cookie(request.headers(), SESSION_COOKIE)
        .and_then(|token| state.sessions.refresh(token));

    let Some(token) = refreshed else {
        return next.run(request).await;
    };

    debug!(user_id = %token.claims.sub, "Session refreshed");
    request.extensions_mut().insert(token.claims.clone());
    let mut response = next.run(request).await;

    if !sets_session_cookie(&response) {
        if let Ok(value) = HeaderValue::from_str(&session_cookie(&token.value, state.sessions.ttl())) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

/// Claims of the signed-in user; rejects with 401 otherwise
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionClaims);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .map(CurrentUser)
            .ok_or(ApiError::Checkout(CheckoutError::Unauthenticated))
    }
}

/// Claims of the signed-in user, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<SessionClaims>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<SessionClaims>().cloned()))
    }
}

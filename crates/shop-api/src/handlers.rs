//! # Request Handlers
//!
//! Axum request handlers for the storefront. JSON endpoints return
//! [`ApiError`] on failure; the browser-facing checkout endpoints always
//! answer with a redirect.

use crate::error::ApiError;
use crate::session::{clear_session_cookie, session_cookie, CurrentUser, MaybeUser};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shop_core::{
    CartItem, CartView, CheckoutError, CompletionOutcome, NewProduct, Order, OrderDetail,
    OrderStatus, Product, ProductUpdate, Role, SessionClaims,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    /// Session expiry (unix seconds)
    pub expires_at: i64,
}

/// Add to cart request
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductList {
    pub products: Vec<Product>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CompleteParams {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

// =============================================================================
// Health & Auth
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "storefront",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Authenticate with the identity provider and set the session cookie
#[instrument(skip(state, request))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let identity = state
        .identity
        .authenticate(&request.email, &request.password)
        .await?;
    let token = state.sessions.issue(&identity.user_id, identity.role)?;

    info!(
        user_id = %identity.user_id,
        provider = state.identity.provider_name(),
        "User logged in"
    );

    let body = LoginResponse {
        user_id: identity.user_id,
        email: identity.email,
        role: identity.role,
        expires_at: token.claims.exp,
    };
    Ok((
        [(SET_COOKIE, session_cookie(&token.value, state.sessions.ttl()))],
        Json(body),
    )
        .into_response())
}

pub async fn logout() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, [(SET_COOKIE, clear_session_cookie())])
}

pub async fn current_session(CurrentUser(claims): CurrentUser) -> Json<SessionClaims> {
    Json(claims)
}

// =============================================================================
// Products
// =============================================================================

pub async fn list_products(State(state): State<AppState>) -> Result<Json<ProductList>, ApiError> {
    let products = state.catalog.list_active_products().await?;
    Ok(Json(ProductList {
        count: products.len(),
        products,
    }))
}

/// Get single active product
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .catalog
        .get_product(&product_id)
        .await?
        .filter(Product::is_active)
        .ok_or_else(|| CheckoutError::not_found("product", &product_id))?;

    Ok(Json(product))
}

// =============================================================================
// Cart
// =============================================================================

/// The user's active cart, or `null`
pub async fn get_cart(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<Option<CartView>>, ApiError> {
    Ok(Json(state.carts.active_cart(claims.user_id()).await?))
}

pub async fn add_cart_item(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(request): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let item = state
        .carts
        .add_to_cart(claims.user_id(), &request.product_id, request.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Set an item's quantity; `0` removes it and answers 204
pub async fn update_cart_item(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Response, ApiError> {
    let updated = state
        .carts
        .update_quantity(claims.user_id(), cart_id, item_id, request.quantity)
        .await?;

    Ok(match updated {
        Some(item) => Json(item).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .carts
        .remove_from_cart(claims.user_id(), cart_id, item_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cart(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(cart_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.carts.clear_cart(claims.user_id(), cart_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Checkout
// =============================================================================

fn error_redirect(reason: &str) -> Redirect {
    Redirect::to(&format!("/checkout/error?reason={reason}"))
}

/// Start checkout for the current user's cart and send the browser to the
/// payment page
#[instrument(skip_all)]
pub async fn start_checkout(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
) -> Redirect {
    match state.checkout.initiate_checkout(claims.as_ref()).await {
        Ok(redirect) => {
            info!(order_id = %redirect.order_id, "Redirecting to payment page");
            Redirect::to(&redirect.checkout_url)
        }
        Err(e) => {
            warn!("Checkout could not start: {}", e);
            error_redirect(e.reason())
        }
    }
}

/// Resolve a returning customer's checkout session synchronously
#[instrument(skip_all)]
pub async fn complete_checkout(
    State(state): State<AppState>,
    Query(params): Query<CompleteParams>,
) -> Redirect {
    let Some(session_id) = params.session_id.filter(|s| !s.trim().is_empty()) else {
        return error_redirect("missing_session");
    };

    match state.checkout.complete_checkout_session(&session_id).await {
        Ok(outcome) => completion_redirect(&outcome),
        Err(e) => {
            error!(session_id = %session_id, "Checkout completion failed: {}", e);
            error_redirect(e.reason())
        }
    }
}

fn completion_redirect(outcome: &CompletionOutcome) -> Redirect {
    match outcome.order() {
        Some(order) if order.status == OrderStatus::Failed => error_redirect("payment_failed"),
        Some(order) => Redirect::to(&format!(
            "/checkout/success?order_id={}&status={}",
            order.id,
            order.status.as_str()
        )),
        None => Redirect::to("/checkout/success?status=processing"),
    }
}

/// Handle Stripe webhook
#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingHeader("Stripe-Signature"))?;

    let event = state
        .checkout
        .gateway()
        .verify_webhook(&body, signature)
        .await
        .map_err(|e| {
            warn!("Webhook rejected: {}", e);
            e
        })?;

    info!("Received webhook: type={:?}, id={}", event.event_type, event.event_id);

    let Some(completion) = event.completion else {
        info!("Webhook event has no checkout effect, acknowledged");
        return Ok(Json(serde_json::json!({ "received": true })));
    };

    // Non-2xx makes Stripe redeliver
    let outcome = state
        .checkout
        .handle_payment_completion(&completion)
        .await
        .map_err(|e| {
            error!(event_id = %event.event_id, "Webhook not applied: {}", e);
            e
        })?;

    Ok(Json(serde_json::json!({
        "received": true,
        "order_id": outcome.order().map(|o| o.id),
    })))
}

// =============================================================================
// Orders
// =============================================================================

pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.orders_for_user(claims.user_id()).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetail>, ApiError> {
    Ok(Json(
        state.orders.order_detail(claims.user_id(), order_id).await?,
    ))
}

// =============================================================================
// Admin
// =============================================================================

pub async fn admin_create_product(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    Json(request): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state
        .catalog_admin
        .create_product(claims.as_ref(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn admin_update_product(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    Path(product_id): Path<String>,
    Json(update): Json<ProductUpdate>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(
        state
            .catalog_admin
            .update_product(claims.as_ref(), &product_id, update)
            .await?,
    ))
}

pub async fn admin_retire_product(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(
        state
            .catalog_admin
            .retire_product(claims.as_ref(), &product_id)
            .await?,
    ))
}

// =============================================================================
// Pages
// =============================================================================

fn page(icon: &str, title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"
<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #f4f4f5;">
    <div style="background: white; padding: 60px; border-radius: 16px; text-align: center;">
        <div style="font-size: 60px;">{icon}</div>
        <h1>{title}</h1>
        {body}
    </div>
</body>
</html>
"#
    ))
}

/// Keep query values that end up in HTML to a safe alphabet
fn sanitize(value: Option<&str>) -> String {
    value
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect()
}

/// Checkout success page
pub async fn checkout_success(Query(params): Query<PageParams>) -> Html<String> {
    let order_id = sanitize(params.order_id.as_deref());
    let status = sanitize(params.status.as_deref());

    let body = if status == "paid" {
        format!(r#"<p>Order <code>{order_id}</code> is paid.</p><p style="color: #666;">A confirmation email is on its way.</p>"#)
    } else {
        r#"<p style="color: #666;">Your payment is being processed. We will email you once it is confirmed.</p>"#.to_string()
    };
    page("✅", "Thank you!", &body)
}

/// Checkout cancel page
pub async fn checkout_cancel() -> Html<String> {
    page(
        "❌",
        "Payment Cancelled",
        r#"<p style="color: #666;">No charges were made. Your cart is still waiting for you.</p>"#,
    )
}

/// Checkout error page
pub async fn checkout_error(Query(params): Query<PageParams>) -> Html<String> {
    let message = match sanitize(params.reason.as_deref()).as_str() {
        "empty_cart" => "Your cart is empty.",
        "unauthenticated" => "Please log in to check out.",
        "payment_failed" => "Your payment did not go through. No charges were made.",
        "upstream_failure" => "The payment provider is unavailable. Please try again shortly.",
        _ => "Something went wrong with your checkout.",
    };
    page(
        "⚠️",
        "Checkout Problem",
        &format!(r#"<p style="color: #666;">{message}</p>"#),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;
    use shop_core::{calculate_order_amount, Currency};

    fn location(redirect: Redirect) -> String {
        let response = redirect.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        response.headers()[LOCATION].to_str().unwrap().to_string()
    }

    fn order(status: OrderStatus) -> Order {
        let mut order = Order::pending("u1", Uuid::new_v4(), calculate_order_amount(1000).unwrap(), Currency::USD);
        order.status = status;
        order
    }

    #[test]
    fn test_completion_redirects() {
        let paid = order(OrderStatus::Paid);
        assert_eq!(
            location(completion_redirect(&CompletionOutcome::Paid(paid.clone()))),
            format!("/checkout/success?order_id={}&status=paid", paid.id)
        );
        assert_eq!(
            location(completion_redirect(&CompletionOutcome::Duplicate(order(OrderStatus::Failed)))),
            "/checkout/error?reason=payment_failed"
        );
        assert_eq!(
            location(completion_redirect(&CompletionOutcome::Ignored {
                session_id: "cs_1".into(),
                status: "processing".into(),
            })),
            "/checkout/success?status=processing"
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(Some("<script>alert(1)</script>")), "scriptalert1script");
        assert_eq!(sanitize(Some("empty_cart")), "empty_cart");
        assert_eq!(sanitize(None), "");
    }
}

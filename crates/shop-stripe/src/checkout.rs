//! # Stripe Checkout Sessions
//!
//! [`PaymentGateway`] implementation on top of the Stripe Checkout Sessions API.

use crate::config::StripeConfig;
use crate::webhook::{self, StripeCheckoutSessionObject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use shop_core::{
    CheckoutError, CheckoutResult, CheckoutSession, CheckoutUrls, Order, OrderItem,
    PaymentCompletion, PaymentGateway, WebhookEvent,
};
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "stripe";

/// Stripe Checkout Session gateway
///
/// Uses Stripe's hosted checkout page; card data never touches the storefront.
pub struct StripeCheckoutGateway {
    config: StripeConfig,
    client: Client,
}

impl StripeCheckoutGateway {
    /// Create a new Stripe checkout gateway
    pub fn new(config: StripeConfig) -> CheckoutResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CheckoutError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Form parameters for `POST /v1/checkout/sessions`.
    ///
    /// One line item per order item at its snapshot price, plus a tax line, so
    /// the amount Stripe charges equals the order's computed total.
    fn build_form_params(
        &self,
        order: &Order,
        items: &[OrderItem],
        urls: &CheckoutUrls,
    ) -> Vec<(String, String)> {
        let order_id = order.id.to_string();
        let currency = order.currency.as_str();

        let mut form_params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), urls.success_url()),
            ("cancel_url".to_string(), urls.cancel_url()),
            ("client_reference_id".to_string(), order_id.clone()),
            ("metadata[order_id]".to_string(), order_id.clone()),
            ("payment_intent_data[metadata][order_id]".to_string(), order_id),
        ];

        let mut push_line = |i: usize, name: &str, unit_amount: i64, quantity: u32| {
            form_params.push((
                format!("line_items[{i}][price_data][currency]"),
                currency.to_string(),
            ));
            form_params.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                unit_amount.to_string(),
            ));
            form_params.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                name.to_string(),
            ));
            form_params.push((format!("line_items[{i}][quantity]"), quantity.to_string()));
        };

        for (i, item) in items.iter().enumerate() {
            push_line(i, &item.product_name, item.price, item.quantity);
        }
        if order.tax_amount > 0 {
            push_line(items.len(), "Tax", order.tax_amount, 1);
        }

        if let Some(ref email) = order.customer_email {
            form_params.push(("customer_email".to_string(), email.clone()));
        }

        for (i, country) in self.config.shipping_countries.iter().enumerate() {
            form_params.push((
                format!("shipping_address_collection[allowed_countries][{i}]"),
                country.clone(),
            ));
        }

        form_params
    }

    /// Read a Stripe response body, mapping non-2xx to `UpstreamFailure`
    async fn read_body(response: Response) -> CheckoutResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CheckoutError::upstream(PROVIDER, e))?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);

            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
            return Err(CheckoutError::upstream(PROVIDER, message));
        }

        Ok(body)
    }
}

#[async_trait]
impl PaymentGateway for StripeCheckoutGateway {
    #[instrument(skip_all, fields(order_id = %order.id))]
    async fn create_checkout(
        &self,
        order: &Order,
        items: &[OrderItem],
        urls: &CheckoutUrls,
    ) -> CheckoutResult<CheckoutSession> {
        if items.is_empty() {
            return Err(CheckoutError::InvalidRequest(
                "Order has no items".to_string(),
            ));
        }

        let form_params = self.build_form_params(order, items, urls);
        debug!(
            "Creating Stripe checkout session: {} items, total={}",
            items.len(),
            order.total_amount
        );

        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", order.id.to_string())
            .form(&form_params)
            .send()
            .await
            .map_err(|e| CheckoutError::upstream(PROVIDER, e))?;

        let body = Self::read_body(response).await?;
        let session: StripeCheckoutSessionResponse = serde_json::from_str(&body)
            .map_err(|e| CheckoutError::upstream(PROVIDER, format!("unexpected response: {e}")))?;

        let checkout_url = session.url.ok_or_else(|| {
            CheckoutError::upstream(PROVIDER, "checkout session has no redirect url")
        })?;

        info!("Created Stripe checkout session: id={}", session.id);

        Ok(CheckoutSession {
            session_id: session.id,
            order_id: order.id,
            provider: PROVIDER.to_string(),
            checkout_url,
            expires_at: session
                .expires_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            created_at: Utc::now(),
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_completion(&self, session_id: &str) -> CheckoutResult<PaymentCompletion> {
        let url = format!(
            "{}/v1/checkout/sessions/{}",
            self.config.api_base_url, session_id
        );
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .send()
            .await
            .map_err(|e| CheckoutError::upstream(PROVIDER, e))?;

        let body = Self::read_body(response).await?;
        let session: StripeCheckoutSessionObject = serde_json::from_str(&body)
            .map_err(|e| CheckoutError::upstream(PROVIDER, format!("unexpected response: {e}")))?;

        Ok(session.into_completion(None))
    }

    #[instrument(skip_all)]
    async fn verify_webhook(&self, payload: &[u8], signature: &str) -> CheckoutResult<WebhookEvent> {
        webhook::verify_signature(&self.config.webhook_secret, payload, signature, Utc::now())?;
        webhook::parse_event(payload)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCheckoutSessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}

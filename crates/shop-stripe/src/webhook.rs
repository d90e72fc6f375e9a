//! # Stripe Webhook Handling
//!
//! Signature verification and parsing of Stripe webhook events into
//! provider-neutral [`WebhookEvent`]s.
//!
//! Stripe signs each delivery with a `Stripe-Signature` header of the form
//! `t=<unix ts>,v1=<hex hmac>[,v1=...]`, where the HMAC-SHA256 is computed
//! over `"{t}.{raw body}"` with the endpoint's signing secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use shop_core::{
    CheckoutError, CheckoutResult, PaymentCompletion, PaymentStatus, ShippingAddress,
    WebhookEvent, WebhookEventType,
};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age (and clock skew) of a signed delivery, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Events that should be enabled for the endpoint in the Stripe Dashboard
pub const HANDLED_WEBHOOK_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
    "checkout.session.async_payment_failed",
    "checkout.session.expired",
];

// =============================================================================
// Signature Verification
// =============================================================================

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> CheckoutResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        CheckoutError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(CheckoutError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> CheckoutResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CheckoutError::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a `Stripe-Signature` header value (used by tests and local tooling)
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> CheckoutResult<String> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        compute_signature(secret, timestamp, payload)?
    ))
}

/// Verify a `Stripe-Signature` header against the raw payload at time `now`
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: DateTime<Utc>,
) -> CheckoutResult<()> {
    let parsed = parse_signature_header(header)?;

    if (now.timestamp() - parsed.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(CheckoutError::WebhookVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let expected = compute_signature(secret, parsed.timestamp, payload)?;
    let valid = parsed
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected));

    if !valid {
        return Err(CheckoutError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }
    Ok(())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

// =============================================================================
// Event Parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

/// Parse a (verified) webhook body
pub fn parse_event(payload: &[u8]) -> CheckoutResult<WebhookEvent> {
    let event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
        CheckoutError::WebhookParseError(format!("Failed to parse webhook: {e}"))
    })?;

    debug!("Parsed Stripe webhook: id={}, type={}", event.id, event.event_type);

    let event_type = match event.event_type.as_str() {
        "checkout.session.completed" => WebhookEventType::CheckoutCompleted,
        "checkout.session.async_payment_succeeded" => WebhookEventType::AsyncPaymentSucceeded,
        "checkout.session.async_payment_failed" => WebhookEventType::AsyncPaymentFailed,
        "checkout.session.expired" => WebhookEventType::CheckoutExpired,
        other => WebhookEventType::Unknown(other.to_string()),
    };

    let completion = match event_type {
        WebhookEventType::Unknown(_) => None,
        WebhookEventType::CheckoutCompleted | WebhookEventType::AsyncPaymentSucceeded => {
            Some(session_object(event.data.object)?.into_completion(None))
        }
        // The session's own payment_status is still "unpaid" here; make it explicit
        WebhookEventType::AsyncPaymentFailed | WebhookEventType::CheckoutExpired => Some(
            session_object(event.data.object)?.into_completion(Some(PaymentStatus::Unpaid)),
        ),
    };

    Ok(WebhookEvent {
        event_id: event.id,
        event_type,
        provider: "stripe".to_string(),
        completion,
        timestamp: DateTime::from_timestamp(event.created, 0).unwrap_or_else(Utc::now),
    })
}

fn session_object(object: serde_json::Value) -> CheckoutResult<StripeCheckoutSessionObject> {
    serde_json::from_value(object).map_err(|e| {
        CheckoutError::WebhookParseError(format!("Invalid checkout session object: {e}"))
    })
}

// =============================================================================
// Checkout Session Object
// =============================================================================

/// The subset of a Stripe Checkout Session the storefront reads
#[derive(Debug, Deserialize)]
pub(crate) struct StripeCheckoutSessionObject {
    pub id: String,
    /// Session lifecycle: "open", "complete" or "expired"
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Either an id or an expanded PaymentIntent object
    #[serde(default)]
    pub payment_intent: Option<serde_json::Value>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<StripeCustomerDetails>,
    #[serde(default)]
    pub shipping_details: Option<StripeShippingDetails>,
    #[serde(default)]
    pub collected_information: Option<StripeCollectedInformation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StripeCustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StripeCollectedInformation {
    #[serde(default)]
    pub shipping_details: Option<StripeShippingDetails>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StripeShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<StripeAddress>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StripeAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl StripeCheckoutSessionObject {
    /// Payment status of a session that has not been reported as failed.
    ///
    /// A completed session can still be `unpaid` while a delayed payment
    /// method settles; that is reported as `processing` so the order stays
    /// pending until `async_payment_succeeded` or `async_payment_failed`.
    /// Only an expired session counts as unpaid.
    fn settled_status(&self) -> PaymentStatus {
        if self.status.as_deref() == Some("expired") {
            return PaymentStatus::Unpaid;
        }
        match self.payment_status.as_deref() {
            Some("unpaid") | None => PaymentStatus::Other("processing".to_string()),
            Some(other) => PaymentStatus::from_provider(other),
        }
    }

    pub(crate) fn into_completion(self, status_override: Option<PaymentStatus>) -> PaymentCompletion {
        let payment_status = status_override.unwrap_or_else(|| self.settled_status());

        let payment_intent_id = self.payment_intent.as_ref().and_then(|pi| match pi {
            serde_json::Value::String(id) => Some(id.clone()),
            serde_json::Value::Object(obj) => obj.get("id").and_then(|v| v.as_str()).map(String::from),
            _ => None,
        });

        let customer_email = self
            .customer_details
            .and_then(|cd| cd.email)
            .or(self.customer_email);

        let shipping_address = self
            .shipping_details
            .or_else(|| self.collected_information.and_then(|ci| ci.shipping_details))
            .map(|details| {
                let address = details.address.unwrap_or_default();
                ShippingAddress {
                    name: details.name,
                    line1: address.line1,
                    line2: address.line2,
                    city: address.city,
                    state: address.state,
                    postal_code: address.postal_code,
                    country: address.country,
                }
            });

        PaymentCompletion {
            session_id: self.id,
            payment_status,
            payment_intent_id,
            customer_email,
            shipping_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn session_event(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_test_1",
            "type": event_type,
            "created": 1_700_000_000,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_signature_header() {
        let header = "t=1234567890,v1=abc123,v1=def456,v0=old";
        let parsed = parse_signature_header(header).unwrap();

        assert_eq!(parsed.timestamp, 1234567890);
        assert_eq!(parsed.signatures, vec!["abc123", "def456"]);
    }

    #[test]
    fn test_parse_signature_header_missing_parts() {
        assert!(parse_signature_header("v1=abc").is_err());
        assert!(parse_signature_header("t=123").is_err());
        assert!(parse_signature_header("").is_err());
    }

    #[test]
    fn test_compute_signature_is_hex_sha256() {
        let sig = compute_signature(SECRET, 1234567890, b"{}").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_verify_signature() {
        let now = Utc::now();
        let payload = br#"{"id":"evt_1"}"#;
        let header = signature_header(SECRET, now.timestamp(), payload).unwrap();

        assert!(verify_signature(SECRET, payload, &header, now).is_ok());

        // Tampered body
        let err = verify_signature(SECRET, br#"{"id":"evt_2"}"#, &header, now).unwrap_err();
        assert!(matches!(err, CheckoutError::WebhookVerificationFailed(_)));

        // Wrong secret
        assert!(verify_signature("whsec_other", payload, &header, now).is_err());

        // Stale delivery
        let later = now + Duration::seconds(SIGNATURE_TOLERANCE_SECS + 1);
        assert!(verify_signature(SECRET, payload, &header, later).is_err());
    }

    #[test]
    fn test_parse_completed_event() {
        let payload = session_event(
            "checkout.session.completed",
            json!({
                "id": "cs_test_123",
                "payment_status": "paid",
                "payment_intent": "pi_test_456",
                "customer_details": { "email": "test@example.com" },
                "shipping_details": {
                    "name": "Ada Lovelace",
                    "address": { "line1": "1 Main St", "city": "Springfield", "country": "US" }
                }
            }),
        );

        let event = parse_event(&payload).unwrap();
        assert_eq!(event.event_type, WebhookEventType::CheckoutCompleted);
        assert_eq!(event.timestamp.timestamp(), 1_700_000_000);

        let completion = event.completion.unwrap();
        assert_eq!(completion.session_id, "cs_test_123");
        assert_eq!(completion.payment_status, PaymentStatus::Paid);
        assert_eq!(completion.payment_intent_id.as_deref(), Some("pi_test_456"));
        assert_eq!(completion.customer_email.as_deref(), Some("test@example.com"));

        let address = completion.shipping_address.unwrap();
        assert_eq!(address.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(address.city.as_deref(), Some("Springfield"));
        assert!(address.postal_code.is_none());
    }

    #[test]
    fn test_collected_information_shipping_fallback() {
        let payload = session_event(
            "checkout.session.completed",
            json!({
                "id": "cs_test_123",
                "payment_status": "paid",
                "payment_intent": { "id": "pi_expanded" },
                "collected_information": {
                    "shipping_details": { "name": "Grace", "address": { "country": "CA" } }
                }
            }),
        );

        let completion = parse_event(&payload).unwrap().completion.unwrap();
        assert_eq!(completion.payment_intent_id.as_deref(), Some("pi_expanded"));
        assert_eq!(
            completion.shipping_address.unwrap().country.as_deref(),
            Some("CA")
        );
    }

    #[test]
    fn test_expired_and_failed_events_are_unpaid() {
        for event_type in ["checkout.session.expired", "checkout.session.async_payment_failed"] {
            let payload = session_event(
                event_type,
                json!({ "id": "cs_test_9", "payment_status": "no_payment_required" }),
            );
            let completion = parse_event(&payload).unwrap().completion.unwrap();
            assert_eq!(completion.payment_status, PaymentStatus::Unpaid);
        }
    }

    #[test]
    fn test_completed_but_unpaid_is_processing() {
        let payload = session_event(
            "checkout.session.completed",
            json!({ "id": "cs_test_ach", "status": "complete", "payment_status": "unpaid" }),
        );

        let completion = parse_event(&payload).unwrap().completion.unwrap();
        assert_eq!(
            completion.payment_status,
            PaymentStatus::Other("processing".to_string())
        );
    }

    #[test]
    fn test_expired_session_object_is_unpaid() {
        let session: StripeCheckoutSessionObject = serde_json::from_value(json!({
            "id": "cs_test_old",
            "status": "expired",
            "payment_status": "unpaid"
        }))
        .unwrap();

        assert_eq!(session.into_completion(None).payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn test_unknown_event_has_no_completion() {
        let payload = session_event("charge.refunded", json!({ "id": "ch_1" }));
        let event = parse_event(&payload).unwrap();

        assert_eq!(
            event.event_type,
            WebhookEventType::Unknown("charge.refunded".to_string())
        );
        assert!(event.completion.is_none());
    }

    #[test]
    fn test_malformed_payload() {
        let err = parse_event(b"not json").unwrap_err();
        assert!(matches!(err, CheckoutError::WebhookParseError(_)));
    }
}

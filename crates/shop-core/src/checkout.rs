//! # Checkout Orchestrator
//!
//! Ties the cart store, order ledger, payment gateway and mailer together.
//!
//! ```text
//! initiate_checkout:   session ─► active cart ─► snapshot + totals ─► pending order
//!                                                   ─► gateway session ─► redirect
//! payment completion:  session id ─► CAS pending→paid|failed ─► (winner only)
//!                                                   retire cart, confirmation email
//! ```
//!
//! Dependencies are passed in explicitly; there is no global registry.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cart::CartStore;
use crate::error::{CheckoutError, CheckoutResult};
use crate::gateway::{CheckoutUrls, PaymentCompletion, PaymentGateway, PaymentStatus};
use crate::notify::{EmailMessage, Mailer, ORDER_CONFIRMATION_TEMPLATE};
use crate::order::{Order, OrderItem, OrderLedger, OrderStatus, TransitionOutcome};
use crate::pricing::{calculate_order_amount_with, TaxRate};
use crate::product::{Currency, Product};
use crate::session::SessionClaims;

/// What to do with an order whose checkout session ended unpaid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnpaidPolicy {
    /// Transition the order to `Failed`
    #[default]
    MarkFailed,
    /// Keep the order `Pending`
    LeavePending,
}

impl FromStr for UnpaidPolicy {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mark_failed" => Ok(UnpaidPolicy::MarkFailed),
            "leave_pending" => Ok(UnpaidPolicy::LeavePending),
            other => Err(CheckoutError::Configuration(format!(
                "unknown unpaid policy: {other}"
            ))),
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// The only currency the store charges in
    pub currency: Currency,
    pub tax_rate: TaxRate,
    pub unpaid_policy: UnpaidPolicy,
    pub urls: CheckoutUrls,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: Currency::USD,
            tax_rate: TaxRate::default(),
            unpaid_policy: UnpaidPolicy::default(),
            urls: CheckoutUrls::default(),
        }
    }
}

/// Where to send the customer after a successful `initiate_checkout`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRedirect {
    pub order_id: Uuid,
    pub session_id: String,
    pub checkout_url: String,
}

/// Result of handling one payment completion
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// This event moved the order to `Paid`
    Paid(Order),
    /// This event moved the order to `Failed`
    Failed(Order),
    /// The order was already final; nothing was applied
    Duplicate(Order),
    /// Unpaid, and the policy keeps the order pending
    LeftPending(Order),
    /// Payment status with no defined effect
    Ignored { session_id: String, status: String },
}

impl CompletionOutcome {
    pub fn order(&self) -> Option<&Order> {
        match self {
            CompletionOutcome::Paid(order)
            | CompletionOutcome::Failed(order)
            | CompletionOutcome::Duplicate(order)
            | CompletionOutcome::LeftPending(order) => Some(order),
            CompletionOutcome::Ignored { .. } => None,
        }
    }
}

/// Coordinates checkout initiation and payment completion
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    carts: Arc<dyn CartStore>,
    ledger: Arc<dyn OrderLedger>,
    gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
    config: CheckoutConfig,
}

impl CheckoutOrchestrator {
    pub fn new(
        carts: Arc<dyn CartStore>,
        ledger: Arc<dyn OrderLedger>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            carts,
            ledger,
            gateway,
            mailer,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    /// Snapshot the user's active cart into a pending order and open a
    /// payment session for its server-computed total.
    #[instrument(skip_all)]
    pub async fn initiate_checkout(
        &self,
        session: Option<&SessionClaims>,
    ) -> CheckoutResult<CheckoutRedirect> {
        let claims = session.ok_or(CheckoutError::Unauthenticated)?;
        let user_id = claims.user_id();

        let cart = self
            .carts
            .find_active_cart(user_id)
            .await?
            .ok_or(CheckoutError::EmptyCart)?;
        let lines = self.carts.get_cart_items(cart.id).await?;

        let mut purchasable: Vec<(&Product, u32)> = Vec::with_capacity(lines.len());
        for line in &lines {
            match &line.product {
                Some(product) if product.is_active() => {
                    if product.currency != self.config.currency {
                        return Err(CheckoutError::InvalidRequest(format!(
                            "product {} is priced in {}, store charges {}",
                            product.id, product.currency, self.config.currency
                        )));
                    }
                    purchasable.push((product, line.item.quantity));
                }
                _ => warn!(
                    product_id = %line.item.product_id,
                    "Skipping unavailable product at checkout"
                ),
            }
        }
        if purchasable.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let order_id = Uuid::new_v4();
        let items = purchasable
            .iter()
            .map(|(product, quantity)| OrderItem::snapshot(order_id, product, *quantity))
            .collect::<CheckoutResult<Vec<_>>>()?;

        let subtotal = items.iter().try_fold(0_i64, |sum, item| {
            sum.checked_add(item.line_total()?).ok_or_else(|| {
                CheckoutError::InvalidRequest("order subtotal out of range".to_string())
            })
        })?;
        let amount = calculate_order_amount_with(subtotal, self.config.tax_rate)?;
        let order = Order {
            id: order_id,
            ..Order::pending(user_id, cart.id, amount, self.config.currency)
        };

        let order = self.ledger.create_order(order, items.clone()).await?;
        info!(
            order_id = %order.id,
            items = items.len(),
            total = %order.total().display(),
            "Created pending order"
        );

        let session = self
            .gateway
            .create_checkout(&order, &items, &self.config.urls)
            .await
            .map_err(|e| {
                error!(order_id = %order.id, "Failed to create checkout session: {}", e);
                e
            })?;

        self.ledger
            .attach_payment_session(order.id, &session.session_id)
            .await?;
        info!(
            order_id = %order.id,
            session_id = %session.session_id,
            provider = self.gateway.provider_name(),
            "Checkout session opened"
        );

        Ok(CheckoutRedirect {
            order_id: order.id,
            session_id: session.session_id,
            checkout_url: session.checkout_url,
        })
    }

    /// Apply a payment provider verdict to the matching order. Idempotent.
    #[instrument(skip(self, completion), fields(session_id = %completion.session_id, status = completion.payment_status.as_str()))]
    pub async fn handle_payment_completion(
        &self,
        completion: &PaymentCompletion,
    ) -> CheckoutResult<CompletionOutcome> {
        let session_id = completion.session_id.as_str();

        match &completion.payment_status {
            PaymentStatus::Paid => {
                let outcome = self
                    .ledger
                    .transition_by_session(session_id, OrderStatus::Paid, completion.payment_details())
                    .await?
                    .ok_or_else(|| reconciliation(session_id))?;

                match outcome {
                    TransitionOutcome::Applied(order) => {
                        info!(order_id = %order.id, total = %order.total().display(), "Order paid");
                        self.after_paid(&order).await;
                        Ok(CompletionOutcome::Paid(order))
                    }
                    TransitionOutcome::AlreadyFinal(order) => {
                        info!(order_id = %order.id, status = order.status.as_str(), "Duplicate payment event ignored");
                        Ok(CompletionOutcome::Duplicate(order))
                    }
                }
            }
            PaymentStatus::Unpaid => match self.config.unpaid_policy {
                UnpaidPolicy::MarkFailed => {
                    let outcome = self
                        .ledger
                        .transition_by_session(
                            session_id,
                            OrderStatus::Failed,
                            completion.payment_details(),
                        )
                        .await?
                        .ok_or_else(|| reconciliation(session_id))?;

                    match outcome {
                        TransitionOutcome::Applied(order) => {
                            warn!(order_id = %order.id, "Order payment failed");
                            Ok(CompletionOutcome::Failed(order))
                        }
                        TransitionOutcome::AlreadyFinal(order) => {
                            info!(order_id = %order.id, status = order.status.as_str(), "Duplicate payment event ignored");
                            Ok(CompletionOutcome::Duplicate(order))
                        }
                    }
                }
                UnpaidPolicy::LeavePending => {
                    let order = self
                        .ledger
                        .find_by_payment_session(session_id)
                        .await?
                        .ok_or_else(|| reconciliation(session_id))?;
                    info!(order_id = %order.id, "Unpaid session, order left as is");
                    Ok(CompletionOutcome::LeftPending(order))
                }
            },
            PaymentStatus::Other(status) => {
                info!(status = %status, "Payment status has no effect, ignoring");
                Ok(CompletionOutcome::Ignored {
                    session_id: session_id.to_string(),
                    status: status.clone(),
                })
            }
        }
    }

    /// Resolve a checkout session synchronously (redirect endpoint).
    ///
    /// Fetches the session outcome from the gateway and applies it through the
    /// same idempotent path as webhooks.
    #[instrument(skip(self))]
    pub async fn complete_checkout_session(
        &self,
        session_id: &str,
    ) -> CheckoutResult<CompletionOutcome> {
        if session_id.trim().is_empty() {
            return Err(CheckoutError::InvalidRequest(
                "missing session id".to_string(),
            ));
        }
        if self.ledger.find_by_payment_session(session_id).await?.is_none() {
            return Err(reconciliation(session_id));
        }

        let completion = self.gateway.retrieve_completion(session_id).await?;
        self.handle_payment_completion(&completion).await
    }

    /// Side effects of the winning `Pending -> Paid` transition. Failures are
    /// logged; the transition itself stands.
    async fn after_paid(&self, order: &Order) {
        match self.carts.retire_cart(order.cart_id).await {
            Ok(true) => info!(cart_id = %order.cart_id, "Cart checked out"),
            Ok(false) => debug!(cart_id = %order.cart_id, "Cart already checked out"),
            Err(e) => error!(cart_id = %order.cart_id, "Failed to retire cart: {}", e),
        }

        let Some(email) = order.customer_email.as_deref() else {
            debug!(order_id = %order.id, "No customer email, skipping confirmation");
            return;
        };

        let items = match self.ledger.order_items(order.id).await {
            Ok(items) => items,
            Err(e) => {
                error!(order_id = %order.id, "Failed to load order items for email: {}", e);
                Vec::new()
            }
        };

        let message = EmailMessage::template(
            email,
            ORDER_CONFIRMATION_TEMPLATE,
            json!({
                "order_id": order.id,
                "subtotal": order.subtotal_amount,
                "tax": order.tax_amount,
                "total": order.total_amount,
                "total_display": order.total().display(),
                "currency": order.currency.as_str(),
                "items": items.iter().map(|item| json!({
                    "product_id": item.product_id,
                    "name": item.product_name,
                    "quantity": item.quantity,
                    "price": item.price,
                })).collect::<Vec<_>>(),
            }),
        );

        if let Err(e) = self.mailer.send(message).await {
            error!(order_id = %order.id, "Failed to send order confirmation: {}", e);
        }
    }
}

fn reconciliation(session_id: &str) -> CheckoutError {
    error!(session_id, "Payment event does not match any order");
    CheckoutError::Reconciliation {
        session_id: session_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{CartService, CartStatus};
    use crate::catalog::{ProductCatalog, ProductUpdate};
    use crate::gateway::{CheckoutSession, WebhookEvent};
    use crate::memory::InMemoryStore;
    use crate::notify::OutboxMailer;
    use crate::session::Role;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeGateway {
        created: AtomicUsize,
        last_total: Mutex<Option<i64>>,
        fail: bool,
        completion_status: Mutex<Option<PaymentStatus>>,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_checkout(
            &self,
            order: &Order,
            _items: &[OrderItem],
            _urls: &CheckoutUrls,
        ) -> CheckoutResult<CheckoutSession> {
            if self.fail {
                return Err(CheckoutError::upstream("fake", "provider unavailable"));
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            *self.last_total.lock().unwrap() = Some(order.total_amount);
            Ok(CheckoutSession {
                session_id: format!("cs_test_{n}"),
                order_id: order.id,
                provider: "fake".to_string(),
                checkout_url: format!("https://pay.example.com/cs_test_{n}"),
                expires_at: None,
                created_at: Utc::now(),
            })
        }

        async fn retrieve_completion(&self, session_id: &str) -> CheckoutResult<PaymentCompletion> {
            let status = self
                .completion_status
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(PaymentStatus::Paid);
            Ok(PaymentCompletion::new(session_id, status).with_customer_email("buyer@example.com"))
        }

        async fn verify_webhook(&self, _payload: &[u8], _signature: &str) -> CheckoutResult<WebhookEvent> {
            Err(CheckoutError::WebhookVerificationFailed("not supported".into()))
        }

        fn provider_name(&self) -> &'static str {
            "fake"
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        carts: CartService,
        gateway: Arc<FakeGateway>,
        mailer: Arc<OutboxMailer>,
        orchestrator: CheckoutOrchestrator,
    }

    fn harness_with(gateway: FakeGateway, policy: UnpaidPolicy) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        store.seed_products(vec![
            Product::new("mug", "Mug", Decimal::new(1250, 2), Currency::USD),
            Product::new("poster", "Poster", Decimal::new(800, 2), Currency::USD),
        ]);
        let gateway = Arc::new(gateway);
        let mailer = Arc::new(OutboxMailer::new());
        let config = CheckoutConfig {
            unpaid_policy: policy,
            ..CheckoutConfig::default()
        };
        let orchestrator = CheckoutOrchestrator::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            mailer.clone(),
            config,
        );
        Harness {
            carts: CartService::new(store.clone(), store.clone(), Currency::USD),
            store,
            gateway,
            mailer,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeGateway::default(), UnpaidPolicy::MarkFailed)
    }

    fn session(user_id: &str) -> SessionClaims {
        let now = Utc::now();
        SessionClaims {
            sub: user_id.to_string(),
            role: Role::Customer,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        }
    }

    fn paid(session_id: &str) -> PaymentCompletion {
        PaymentCompletion::new(session_id, PaymentStatus::Paid)
            .with_payment_intent("pi_123")
            .with_customer_email("buyer@example.com")
    }

    async fn checkout_with_items(h: &Harness, user: &str) -> CheckoutRedirect {
        h.carts.add_to_cart(user, "mug", 2).await.unwrap();
        h.carts.add_to_cart(user, "poster", 1).await.unwrap();
        h.orchestrator
            .initiate_checkout(Some(&session(user)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_requires_session() {
        let h = harness();
        let err = h.orchestrator.initiate_checkout(None).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_absent_or_empty_cart_creates_no_order() {
        let h = harness();
        let alice = session("alice");

        let err = h.orchestrator.initiate_checkout(Some(&alice)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));

        let item = h.carts.add_to_cart("alice", "mug", 1).await.unwrap();
        h.carts
            .remove_from_cart("alice", item.cart_id, item.id)
            .await
            .unwrap();
        let err = h.orchestrator.initiate_checkout(Some(&alice)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));

        assert!(h.store.orders_for_user("alice").await.unwrap().is_empty());
        assert_eq!(h.gateway.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_amount_overflow_creates_no_order() {
        let h = harness();
        h.store.seed_products(vec![Product::new(
            "yacht",
            "Yacht",
            Decimal::new(100_000_000, 0),
            Currency::USD,
        )]);
        h.carts.add_to_cart("alice", "yacht", 1_000_000_000).await.unwrap();

        let err = h
            .orchestrator
            .initiate_checkout(Some(&session("alice")))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidRequest(_)));
        assert!(h.store.orders_for_user("alice").await.unwrap().is_empty());
        assert_eq!(h.gateway.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initiate_checkout_creates_pending_order() {
        let h = harness();
        let redirect = checkout_with_items(&h, "alice").await;

        assert_eq!(redirect.checkout_url, "https://pay.example.com/cs_test_0");

        let order = h.store.find_order(redirect.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal_amount, 3300);
        assert_eq!(order.tax_amount, 330);
        assert_eq!(order.total_amount, 3630);
        assert_eq!(order.payment_session_id.as_deref(), Some("cs_test_0"));
        assert_eq!(*h.gateway.last_total.lock().unwrap(), Some(3630));

        let items = h.store.order_items(order.id).await.unwrap();
        assert_eq!(items.len(), 2);

        // Cart stays active until payment arrives
        let cart = h.store.find_active_cart("alice").await.unwrap();
        assert!(cart.is_some());
    }

    #[tokio::test]
    async fn test_retired_products_are_skipped() {
        let h = harness();
        h.carts.add_to_cart("alice", "mug", 1).await.unwrap();
        h.carts.add_to_cart("alice", "poster", 1).await.unwrap();
        h.store.retire_product("poster").await.unwrap();

        let redirect = h
            .orchestrator
            .initiate_checkout(Some(&session("alice")))
            .await
            .unwrap();
        let order = h.store.find_order(redirect.order_id).await.unwrap().unwrap();
        assert_eq!(order.subtotal_amount, 1250);

        h.store.retire_product("mug").await.unwrap();
        let err = h
            .orchestrator
            .initiate_checkout(Some(&session("alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
    }

    #[tokio::test]
    async fn test_repeated_paid_events_apply_once() {
        let h = harness();
        let redirect = checkout_with_items(&h, "alice").await;
        let cart_id = h.store.find_order(redirect.order_id).await.unwrap().unwrap().cart_id;

        let event = paid(&redirect.session_id);
        let first = h.orchestrator.handle_payment_completion(&event).await.unwrap();
        assert!(matches!(first, CompletionOutcome::Paid(_)));

        for _ in 0..4 {
            let again = h.orchestrator.handle_payment_completion(&event).await.unwrap();
            assert!(matches!(again, CompletionOutcome::Duplicate(ref o) if o.status == OrderStatus::Paid));
        }

        let order = h.store.find_order(redirect.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payment_intent_id.as_deref(), Some("pi_123"));

        let cart = h.store.get_cart(cart_id).await.unwrap().unwrap();
        assert_eq!(cart.status, CartStatus::CheckedOut);
        assert!(h.store.find_active_cart("alice").await.unwrap().is_none());

        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template_name(), Some(ORDER_CONFIRMATION_TEMPLATE));
    }

    #[tokio::test]
    async fn test_concurrent_paid_events_apply_once() {
        let h = harness();
        let redirect = checkout_with_items(&h, "alice").await;
        let orchestrator = Arc::new(h.orchestrator.clone());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orchestrator = orchestrator.clone();
            let event = paid(&redirect.session_id);
            handles.push(tokio::spawn(async move {
                orchestrator.handle_payment_completion(&event).await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if let CompletionOutcome::Paid(_) = handle.await.unwrap().unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unpaid_marks_failed_and_keeps_cart() {
        let h = harness();
        let redirect = checkout_with_items(&h, "alice").await;

        let unpaid = PaymentCompletion::new(&redirect.session_id, PaymentStatus::Unpaid);
        let outcome = h.orchestrator.handle_payment_completion(&unpaid).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::Failed(_)));

        // A late paid event cannot resurrect a failed order
        let late = h
            .orchestrator
            .handle_payment_completion(&paid(&redirect.session_id))
            .await
            .unwrap();
        assert!(matches!(late, CompletionOutcome::Duplicate(ref o) if o.status == OrderStatus::Failed));

        let view = h.carts.active_cart("alice").await.unwrap().unwrap();
        assert_eq!(view.lines.len(), 2);
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unpaid_leave_pending_policy() {
        let h = harness_with(FakeGateway::default(), UnpaidPolicy::LeavePending);
        let redirect = checkout_with_items(&h, "alice").await;

        let unpaid = PaymentCompletion::new(&redirect.session_id, PaymentStatus::Unpaid);
        let outcome = h.orchestrator.handle_payment_completion(&unpaid).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::LeftPending(ref o) if o.status == OrderStatus::Pending));
    }

    #[tokio::test]
    async fn test_other_status_is_ignored() {
        let h = harness();
        let redirect = checkout_with_items(&h, "alice").await;

        let processing = PaymentCompletion::new(
            &redirect.session_id,
            PaymentStatus::Other("no_payment_required".into()),
        );
        let outcome = h.orchestrator.handle_payment_completion(&processing).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::Ignored { .. }));
        assert!(outcome.order().is_none());

        let order = h.store.find_order(redirect.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_session_is_reconciliation_failure() {
        let h = harness();
        let err = h
            .orchestrator
            .handle_payment_completion(&paid("cs_nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Reconciliation { .. }));

        let err = h
            .orchestrator
            .complete_checkout_session("cs_nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Reconciliation { .. }));
    }

    #[tokio::test]
    async fn test_order_items_keep_snapshot_price() {
        let h = harness();
        let redirect = checkout_with_items(&h, "alice").await;

        h.store
            .update_product(
                "mug",
                ProductUpdate {
                    price: Some(Decimal::new(9900, 2)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.orchestrator
            .handle_payment_completion(&paid(&redirect.session_id))
            .await
            .unwrap();

        let items = h.store.order_items(redirect.order_id).await.unwrap();
        let mug = items.iter().find(|i| i.product_id == "mug").unwrap();
        assert_eq!(mug.price, 1250);
        assert_eq!(mug.quantity, 2);
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces_as_upstream() {
        let h = harness_with(
            FakeGateway {
                fail: true,
                ..Default::default()
            },
            UnpaidPolicy::MarkFailed,
        );
        h.carts.add_to_cart("alice", "mug", 1).await.unwrap();

        let err = h
            .orchestrator
            .initiate_checkout(Some(&session("alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::UpstreamFailure { .. }));

        let orders = h.store.orders_for_user("alice").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert!(orders[0].payment_session_id.is_none());
    }

    #[tokio::test]
    async fn test_complete_checkout_session_uses_gateway() {
        let h = harness();
        let redirect = checkout_with_items(&h, "alice").await;

        let outcome = h
            .orchestrator
            .complete_checkout_session(&redirect.session_id)
            .await
            .unwrap();
        assert!(matches!(outcome, CompletionOutcome::Paid(_)));

        *h.gateway.completion_status.lock().unwrap() = Some(PaymentStatus::Unpaid);
        let outcome = h
            .orchestrator
            .complete_checkout_session(&redirect.session_id)
            .await
            .unwrap();
        assert!(matches!(outcome, CompletionOutcome::Duplicate(_)));
    }
}

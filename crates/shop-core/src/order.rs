//! # Order Types
//!
//! Orders, order item snapshots and the [`OrderLedger`] port.
//!
//! An order is created `Pending` and leaves that state exactly once, through
//! [`OrderLedger::transition_by_session`]. That call is a compare-and-set on
//! the stored status, so duplicate payment events cannot apply twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CheckoutError, CheckoutResult};
use crate::pricing::OrderAmount;
use crate::product::{Currency, Money, Product};

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting the payment provider's verdict
    Pending,
    Paid,
    Failed,
}

impl OrderStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        }
    }
}

/// Shipping address collected by the payment provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// An order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,

    /// Cart the order was snapshotted from
    pub cart_id: Uuid,

    /// Amounts in minor units
    pub subtotal_amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub currency: Currency,

    pub status: OrderStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,

    /// Provider checkout session id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a pending order from computed amounts
    pub fn pending(
        user_id: impl Into<String>,
        cart_id: Uuid,
        amount: OrderAmount,
        currency: Currency,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            cart_id,
            subtotal_amount: amount.subtotal,
            tax_amount: amount.tax,
            total_amount: amount.total,
            currency,
            status: OrderStatus::Pending,
            shipping_address: None,
            customer_email: None,
            payment_session_id: None,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total(&self) -> Money {
        Money::new(self.total_amount, self.currency)
    }

    pub fn tax(&self) -> Money {
        Money::new(self.tax_amount, self.currency)
    }
}

/// Immutable snapshot of a purchased product line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: String,
    /// Product name at order time
    pub product_name: String,
    pub quantity: u32,
    /// Unit price in minor units at order time
    pub price: i64,
    pub currency: Currency,
}

impl OrderItem {
    /// Snapshot a product's current price
    pub fn snapshot(order_id: Uuid, product: &Product, quantity: u32) -> CheckoutResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity,
            price: product.unit_amount()?,
            currency: product.currency,
        })
    }

    /// Line total in minor units
    pub fn line_total(&self) -> CheckoutResult<i64> {
        self.price
            .checked_mul(i64::from(self.quantity))
            .ok_or_else(|| {
                CheckoutError::InvalidRequest(format!(
                    "line total out of range for {} x {}",
                    self.product_id, self.quantity
                ))
            })
    }
}

/// Data persisted together with the winning status transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentDetails {
    pub payment_intent_id: Option<String>,
    pub customer_email: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

/// Result of a conditional status transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// This call moved the order out of `Pending`
    Applied(Order),
    /// The order was already final; nothing changed
    AlreadyFinal(Order),
}

impl TransitionOutcome {
    pub fn order(&self) -> &Order {
        match self {
            TransitionOutcome::Applied(order) | TransitionOutcome::AlreadyFinal(order) => order,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Storage port for orders
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Persist a pending order and all of its items as one unit
    async fn create_order(&self, order: Order, items: Vec<OrderItem>) -> CheckoutResult<Order>;

    /// Record the provider session id on a pending order
    async fn attach_payment_session(&self, order_id: Uuid, session_id: &str)
        -> CheckoutResult<Order>;

    async fn find_order(&self, order_id: Uuid) -> CheckoutResult<Option<Order>>;

    async fn find_by_payment_session(&self, session_id: &str) -> CheckoutResult<Option<Order>>;

    async fn order_items(&self, order_id: Uuid) -> CheckoutResult<Vec<OrderItem>>;

    /// Orders of a user, newest first
    async fn orders_for_user(&self, user_id: &str) -> CheckoutResult<Vec<Order>>;

    /// Compare-and-set `Pending -> to` on the order owning `session_id`.
    ///
    /// Must be a single conditional update: of any number of concurrent calls
    /// at most one observes `Applied`. Returns `None` if no order matches.
    async fn transition_by_session(
        &self,
        session_id: &str,
        to: OrderStatus,
        details: PaymentDetails,
    ) -> CheckoutResult<Option<TransitionOutcome>>;
}

/// An order with its items
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Read access to a user's own orders
#[derive(Clone)]
pub struct OrderHistory {
    ledger: Arc<dyn OrderLedger>,
}

impl OrderHistory {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self {
        Self { ledger }
    }

    pub async fn orders_for_user(&self, user_id: &str) -> CheckoutResult<Vec<Order>> {
        self.ledger.orders_for_user(user_id).await
    }

    pub async fn order_detail(&self, user_id: &str, order_id: Uuid) -> CheckoutResult<OrderDetail> {
        let order = self
            .ledger
            .find_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("order", order_id))?;

        if order.user_id != user_id {
            return Err(CheckoutError::Forbidden(format!(
                "order {order_id} does not belong to the current user"
            )));
        }

        let items = self.ledger.order_items(order_id).await?;
        Ok(OrderDetail { order, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::calculate_order_amount;
    use rust_decimal::Decimal;

    #[test]
    fn test_snapshot_line_total() {
        let product = Product::new("lamp", "Desk Lamp", Decimal::new(3450, 2), Currency::USD);
        let item = OrderItem::snapshot(Uuid::new_v4(), &product, 3).unwrap();

        assert_eq!(item.price, 3450);
        assert_eq!(item.line_total().unwrap(), 10350);
        assert_eq!(item.product_name, "Desk Lamp");
    }

    #[test]
    fn test_pending_order_amounts() {
        let order = Order::pending("u1", Uuid::new_v4(), calculate_order_amount(2500).unwrap(), Currency::USD);

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.status.is_final());
        assert_eq!(order.total().display(), "$27.50");
        assert_eq!(order.tax().amount, 250);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Paid).unwrap(),
            "\"paid\""
        );
        assert!(OrderStatus::Failed.is_final());
    }
}

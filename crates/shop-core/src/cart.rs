//! # Cart Types
//!
//! Carts, cart items, the [`CartStore`] port and the ownership-checking
//! [`CartService`] that every cart mutation goes through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::catalog::ProductCatalog;
use crate::error::{CheckoutError, CheckoutResult};
use crate::product::{Currency, Money, Product};

/// Cart status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// Accepting item mutations
    Active,
    /// Items were paid for through an order; terminal
    CheckedOut,
}

/// A shopping cart. At most one `Active` cart exists per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: String,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            status: CartStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CartStatus::Active
    }
}

/// A product line in a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: String,
    /// Always > 0
    pub quantity: u32,
}

/// A cart item joined with its product.
///
/// `product` is `None` when the product no longer exists in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item: CartItem,
    pub product: Option<Product>,
}

impl CartLine {
    /// Whether this line can be checked out
    pub fn is_purchasable(&self) -> bool {
        self.product.as_ref().is_some_and(Product::is_active)
    }

    /// Current line total in minor units, if the product is purchasable
    pub fn line_total(&self) -> Option<i64> {
        let product = self.product.as_ref().filter(|p| p.is_active())?;
        let unit = product.unit_amount().ok()?;
        unit.checked_mul(i64::from(self.item.quantity))
    }
}

/// Storage port for carts.
///
/// Implementations must keep the one-active-cart-per-user invariant and reject
/// item mutations on carts that are no longer active.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The user's active cart, if any
    async fn find_active_cart(&self, user_id: &str) -> CheckoutResult<Option<Cart>>;

    /// Any cart by id, whatever its status
    async fn get_cart(&self, cart_id: Uuid) -> CheckoutResult<Option<Cart>>;

    /// The user's active cart, created if absent
    async fn get_or_create_active_cart(&self, user_id: &str) -> CheckoutResult<Cart>;

    /// Items of a cart joined with their products
    async fn get_cart_items(&self, cart_id: Uuid) -> CheckoutResult<Vec<CartLine>>;

    /// Add `quantity` of a product, merging into an existing line
    async fn add_item(
        &self,
        cart_id: Uuid,
        product_id: &str,
        quantity: u32,
    ) -> CheckoutResult<CartItem>;

    /// Replace the quantity of an item (`quantity > 0`)
    async fn set_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: u32,
    ) -> CheckoutResult<CartItem>;

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> CheckoutResult<()>;

    async fn clear_items(&self, cart_id: Uuid) -> CheckoutResult<()>;

    /// Conditionally move a cart from `Active` to `CheckedOut`.
    ///
    /// Returns `true` only for the call that performed the transition.
    async fn retire_cart(&self, cart_id: Uuid) -> CheckoutResult<bool>;
}

/// A cart with its lines and current subtotal
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub lines: Vec<CartLine>,
    /// Sum of purchasable lines in the store currency
    pub subtotal: Money,
    pub item_count: u32,
}

/// Cart operations scoped to the requesting user
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn CartStore>,
    catalog: Arc<dyn ProductCatalog>,
    currency: Currency,
}

impl CartService {
    pub fn new(
        store: Arc<dyn CartStore>,
        catalog: Arc<dyn ProductCatalog>,
        currency: Currency,
    ) -> Self {
        Self {
            store,
            catalog,
            currency,
        }
    }

    /// The user's active cart with lines, if one exists
    pub async fn active_cart(&self, user_id: &str) -> CheckoutResult<Option<CartView>> {
        let Some(cart) = self.store.find_active_cart(user_id).await? else {
            return Ok(None);
        };
        let lines = self.store.get_cart_items(cart.id).await?;

        let out_of_range = || CheckoutError::InvalidRequest("cart total out of range".to_string());
        let subtotal = lines
            .iter()
            .filter(|line| {
                line.product
                    .as_ref()
                    .is_some_and(|p| p.currency == self.currency)
            })
            .filter_map(CartLine::line_total)
            .try_fold(0_i64, |sum, total| sum.checked_add(total))
            .ok_or_else(out_of_range)?;
        let item_count = lines
            .iter()
            .try_fold(0_u32, |count, l| count.checked_add(l.item.quantity))
            .ok_or_else(out_of_range)?;

        Ok(Some(CartView {
            cart,
            lines,
            subtotal: Money::new(subtotal, self.currency),
            item_count,
        }))
    }

    /// Add a product to the user's active cart, creating the cart lazily
    #[instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> CheckoutResult<CartItem> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidRequest(
                "quantity must be greater than zero".to_string(),
            ));
        }

        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .filter(Product::is_active)
            .ok_or_else(|| CheckoutError::not_found("product", product_id))?;

        let cart = self.store.get_or_create_active_cart(user_id).await?;
        let item = self.store.add_item(cart.id, &product.id, quantity).await?;

        debug!(cart_id = %cart.id, quantity = item.quantity, "Added to cart");
        Ok(item)
    }

    /// Set an item's quantity; zero removes the item.
    ///
    /// Returns the updated item, or `None` if it was removed.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: &str,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: u32,
    ) -> CheckoutResult<Option<CartItem>> {
        self.owned_cart(user_id, cart_id).await?;

        if quantity == 0 {
            self.store.remove_item(cart_id, item_id).await?;
            return Ok(None);
        }

        let item = self
            .store
            .set_item_quantity(cart_id, item_id, quantity)
            .await?;
        Ok(Some(item))
    }

    #[instrument(skip(self))]
    pub async fn remove_from_cart(
        &self,
        user_id: &str,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> CheckoutResult<()> {
        self.owned_cart(user_id, cart_id).await?;
        self.store.remove_item(cart_id, item_id).await
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: &str, cart_id: Uuid) -> CheckoutResult<()> {
        self.owned_cart(user_id, cart_id).await?;
        self.store.clear_items(cart_id).await
    }

    async fn owned_cart(&self, user_id: &str, cart_id: Uuid) -> CheckoutResult<Cart> {
        let cart = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("cart", cart_id))?;

        if cart.user_id != user_id {
            warn!(%cart_id, user_id, "Rejected mutation of another user's cart");
            return Err(CheckoutError::Forbidden(format!(
                "cart {cart_id} does not belong to the current user"
            )));
        }
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use rust_decimal::Decimal;

    fn service() -> (CartService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.seed_products(vec![
            Product::new("mug", "Mug", Decimal::new(1250, 2), Currency::USD),
            Product::new("poster", "Poster", Decimal::new(800, 2), Currency::USD),
        ]);
        let service = CartService::new(store.clone(), store.clone(), Currency::USD);
        (service, store)
    }

    #[tokio::test]
    async fn test_add_to_cart_creates_cart_lazily() {
        let (service, _) = service();
        assert!(service.active_cart("alice").await.unwrap().is_none());

        service.add_to_cart("alice", "mug", 2).await.unwrap();
        service.add_to_cart("alice", "mug", 1).await.unwrap();
        service.add_to_cart("alice", "poster", 1).await.unwrap();

        let view = service.active_cart("alice").await.unwrap().unwrap();
        assert_eq!(view.lines.len(), 2);
        assert_eq!(view.item_count, 4);
        assert_eq!(view.subtotal.amount, 3 * 1250 + 800);
    }

    #[tokio::test]
    async fn test_add_unknown_or_retired_product() {
        let (service, store) = service();
        let err = service.add_to_cart("alice", "nope", 1).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound { .. }));

        store.retire_product("poster").await.unwrap();
        let err = service.add_to_cart("alice", "poster", 1).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound { .. }));

        let err = service.add_to_cart("alice", "mug", 0).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_cannot_mutate_another_users_cart() {
        let (service, _) = service();
        let item = service.add_to_cart("alice", "mug", 1).await.unwrap();

        let err = service
            .remove_from_cart("mallory", item.cart_id, item.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Forbidden(_)));

        let err = service
            .update_quantity("mallory", item.cart_id, item.id, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Forbidden(_)));

        let err = service.clear_cart("mallory", item.cart_id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Forbidden(_)));

        let view = service.active_cart("alice").await.unwrap().unwrap();
        assert_eq!(view.lines[0].item.quantity, 1);
    }

    #[tokio::test]
    async fn test_update_quantity_zero_removes() {
        let (service, _) = service();
        let item = service.add_to_cart("alice", "mug", 1).await.unwrap();

        let updated = service
            .update_quantity("alice", item.cart_id, item.id, 4)
            .await
            .unwrap();
        assert_eq!(updated.map(|i| i.quantity), Some(4));

        let removed = service
            .update_quantity("alice", item.cart_id, item.id, 0)
            .await
            .unwrap();
        assert!(removed.is_none());

        let view = service.active_cart("alice").await.unwrap().unwrap();
        assert!(view.lines.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_cart_is_not_found() {
        let (service, _) = service();
        let err = service
            .remove_from_cart("alice", Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound { .. }));
    }
}

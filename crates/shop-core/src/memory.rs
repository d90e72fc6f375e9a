//! # In-Memory Store
//!
//! A single-process implementation of [`ProductCatalog`], [`CartStore`] and
//! [`OrderLedger`]. All tables live behind one `RwLock`, so every conditional
//! update (active-cart creation, cart retirement, order status transition)
//! happens inside one write-lock critical section.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::cart::{Cart, CartItem, CartLine, CartStatus, CartStore};
use crate::catalog::{ProductCatalog, ProductUpdate};
use crate::error::{CheckoutError, CheckoutResult};
use crate::order::{
    Order, OrderItem, OrderLedger, OrderStatus, PaymentDetails, TransitionOutcome,
};
use crate::product::{Product, ProductLifecycle};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<String, Product>,
    carts: HashMap<Uuid, Cart>,
    /// user id -> id of that user's active cart
    active_carts: HashMap<String, Uuid>,
    /// cart id -> items in insertion order
    cart_items: HashMap<Uuid, Vec<CartItem>>,
    orders: HashMap<Uuid, Order>,
    order_items: HashMap<Uuid, Vec<OrderItem>>,
    orders_by_session: HashMap<String, Uuid>,
}

impl Tables {
    fn active_cart_mut(&mut self, cart_id: Uuid) -> CheckoutResult<&mut Cart> {
        let cart = self
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| CheckoutError::not_found("cart", cart_id))?;
        if !cart.is_active() {
            return Err(CheckoutError::InvalidRequest(format!(
                "cart {cart_id} is no longer active"
            )));
        }
        Ok(cart)
    }

    fn touch_cart(&mut self, cart_id: Uuid) {
        if let Some(cart) = self.carts.get_mut(&cart_id) {
            cart.updated_at = Utc::now();
        }
    }
}

/// In-memory storage for catalog, carts and orders
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load seed products, replacing any with the same id. Returns the count.
    pub fn seed_products(&self, products: impl IntoIterator<Item = Product>) -> usize {
        let mut tables = self.write();
        let mut count = 0;
        for product in products {
            tables.products.insert(product.id.clone(), product);
            count += 1;
        }
        count
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn get_product(&self, id: &str) -> CheckoutResult<Option<Product>> {
        Ok(self.read().products.get(id).cloned())
    }

    async fn list_active_products(&self) -> CheckoutResult<Vec<Product>> {
        let mut products: Vec<Product> = self
            .read()
            .products
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn insert_product(&self, product: Product) -> CheckoutResult<Product> {
        let mut tables = self.write();
        if tables.products.contains_key(&product.id) {
            return Err(CheckoutError::InvalidRequest(format!(
                "product {} already exists",
                product.id
            )));
        }
        tables.products.insert(product.id.clone(), product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: &str, update: ProductUpdate) -> CheckoutResult<Product> {
        let mut tables = self.write();
        let product = tables
            .products
            .get_mut(id)
            .ok_or_else(|| CheckoutError::not_found("product", id))?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(CheckoutError::InvalidRequest(
                    "product name must not be empty".to_string(),
                ));
            }
            product.name = name;
        }
        if let Some(description) = update.description {
            product.description = description;
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        if let Some(image_url) = update.image_url {
            product.image_url = Some(image_url);
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn retire_product(&self, id: &str) -> CheckoutResult<Product> {
        let mut tables = self.write();
        let product = tables
            .products
            .get_mut(id)
            .ok_or_else(|| CheckoutError::not_found("product", id))?;

        if product.is_active() {
            let now = Utc::now();
            product.lifecycle = ProductLifecycle::Retired { retired_at: now };
            product.updated_at = now;
        }
        Ok(product.clone())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn find_active_cart(&self, user_id: &str) -> CheckoutResult<Option<Cart>> {
        let tables = self.read();
        Ok(tables
            .active_carts
            .get(user_id)
            .and_then(|id| tables.carts.get(id))
            .cloned())
    }

    async fn get_cart(&self, cart_id: Uuid) -> CheckoutResult<Option<Cart>> {
        Ok(self.read().carts.get(&cart_id).cloned())
    }

    async fn get_or_create_active_cart(&self, user_id: &str) -> CheckoutResult<Cart> {
        let mut tables = self.write();
        if let Some(cart) = tables
            .active_carts
            .get(user_id)
            .and_then(|id| tables.carts.get(id))
        {
            return Ok(cart.clone());
        }

        let cart = Cart::new(user_id);
        tables.active_carts.insert(user_id.to_string(), cart.id);
        tables.cart_items.insert(cart.id, Vec::new());
        tables.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn get_cart_items(&self, cart_id: Uuid) -> CheckoutResult<Vec<CartLine>> {
        let tables = self.read();
        if !tables.carts.contains_key(&cart_id) {
            return Err(CheckoutError::not_found("cart", cart_id));
        }

        let lines = tables
            .cart_items
            .get(&cart_id)
            .map(|items| {
                items
                    .iter()
                    .map(|item| CartLine {
                        item: item.clone(),
                        product: tables.products.get(&item.product_id).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(lines)
    }

    async fn add_item(
        &self,
        cart_id: Uuid,
        product_id: &str,
        quantity: u32,
    ) -> CheckoutResult<CartItem> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidRequest(
                "quantity must be greater than zero".to_string(),
            ));
        }

        let mut tables = self.write();
        tables.active_cart_mut(cart_id)?;
        if !tables.products.contains_key(product_id) {
            return Err(CheckoutError::not_found("product", product_id));
        }

        let items = tables.cart_items.entry(cart_id).or_default();
        let item = match items.iter_mut().find(|i| i.product_id == product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(quantity).ok_or_else(|| {
                    CheckoutError::InvalidRequest(format!("quantity out of range for {product_id}"))
                })?;
                existing.clone()
            }
            None => {
                let item = CartItem {
                    id: Uuid::new_v4(),
                    cart_id,
                    product_id: product_id.to_string(),
                    quantity,
                };
                items.push(item.clone());
                item
            }
        };
        tables.touch_cart(cart_id);
        Ok(item)
    }

    async fn set_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: u32,
    ) -> CheckoutResult<CartItem> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidRequest(
                "quantity must be greater than zero".to_string(),
            ));
        }

        let mut tables = self.write();
        tables.active_cart_mut(cart_id)?;
        let item = tables
            .cart_items
            .get_mut(&cart_id)
            .and_then(|items| items.iter_mut().find(|i| i.id == item_id))
            .ok_or_else(|| CheckoutError::not_found("cart item", item_id))?;

        item.quantity = quantity;
        let item = item.clone();
        tables.touch_cart(cart_id);
        Ok(item)
    }

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> CheckoutResult<()> {
        let mut tables = self.write();
        tables.active_cart_mut(cart_id)?;
        let items = tables.cart_items.entry(cart_id).or_default();
        let before = items.len();
        items.retain(|i| i.id != item_id);
        if items.len() == before {
            return Err(CheckoutError::not_found("cart item", item_id));
        }
        tables.touch_cart(cart_id);
        Ok(())
    }

    async fn clear_items(&self, cart_id: Uuid) -> CheckoutResult<()> {
        let mut tables = self.write();
        tables.active_cart_mut(cart_id)?;
        tables.cart_items.insert(cart_id, Vec::new());
        tables.touch_cart(cart_id);
        Ok(())
    }

    async fn retire_cart(&self, cart_id: Uuid) -> CheckoutResult<bool> {
        let mut tables = self.write();
        let cart = tables
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| CheckoutError::not_found("cart", cart_id))?;

        if !cart.is_active() {
            return Ok(false);
        }
        cart.status = CartStatus::CheckedOut;
        cart.updated_at = Utc::now();
        let user_id = cart.user_id.clone();

        if tables.active_carts.get(&user_id) == Some(&cart_id) {
            tables.active_carts.remove(&user_id);
        }
        Ok(true)
    }
}

#[async_trait]
impl OrderLedger for InMemoryStore {
    async fn create_order(&self, order: Order, items: Vec<OrderItem>) -> CheckoutResult<Order> {
        if order.status != OrderStatus::Pending {
            return Err(CheckoutError::InvalidRequest(
                "orders must be created pending".to_string(),
            ));
        }
        if items.iter().any(|item| item.order_id != order.id) {
            return Err(CheckoutError::InvalidRequest(
                "order items must reference the new order".to_string(),
            ));
        }

        let mut tables = self.write();
        if tables.orders.contains_key(&order.id) {
            return Err(CheckoutError::InvalidRequest(format!(
                "order {} already exists",
                order.id
            )));
        }
        tables.order_items.insert(order.id, items);
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_id: &str,
    ) -> CheckoutResult<Order> {
        let mut tables = self.write();
        if let Some(owner) = tables.orders_by_session.get(session_id) {
            if *owner != order_id {
                return Err(CheckoutError::InvalidRequest(format!(
                    "payment session {session_id} already belongs to another order"
                )));
            }
        }

        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| CheckoutError::not_found("order", order_id))?;
        let previous = order.payment_session_id.replace(session_id.to_string());
        order.updated_at = Utc::now();
        let order = order.clone();

        if let Some(previous) = previous {
            tables.orders_by_session.remove(&previous);
        }
        tables
            .orders_by_session
            .insert(session_id.to_string(), order_id);
        Ok(order)
    }

    async fn find_order(&self, order_id: Uuid) -> CheckoutResult<Option<Order>> {
        Ok(self.read().orders.get(&order_id).cloned())
    }

    async fn find_by_payment_session(&self, session_id: &str) -> CheckoutResult<Option<Order>> {
        let tables = self.read();
        Ok(tables
            .orders_by_session
            .get(session_id)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn order_items(&self, order_id: Uuid) -> CheckoutResult<Vec<OrderItem>> {
        Ok(self
            .read()
            .order_items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn orders_for_user(&self, user_id: &str) -> CheckoutResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .read()
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn transition_by_session(
        &self,
        session_id: &str,
        to: OrderStatus,
        details: PaymentDetails,
    ) -> CheckoutResult<Option<TransitionOutcome>> {
        if !to.is_final() {
            return Err(CheckoutError::InvalidRequest(format!(
                "cannot transition an order to {}",
                to.as_str()
            )));
        }

        let mut tables = self.write();
        let Some(order_id) = tables.orders_by_session.get(session_id).copied() else {
            return Ok(None);
        };
        let Some(order) = tables.orders.get_mut(&order_id) else {
            return Ok(None);
        };

        if order.status != OrderStatus::Pending {
            return Ok(Some(TransitionOutcome::AlreadyFinal(order.clone())));
        }

        order.status = to;
        if details.payment_intent_id.is_some() {
            order.payment_intent_id = details.payment_intent_id;
        }
        if details.customer_email.is_some() {
            order.customer_email = details.customer_email;
        }
        if details.shipping_address.is_some() {
            order.shipping_address = details.shipping_address;
        }
        order.updated_at = Utc::now();
        Ok(Some(TransitionOutcome::Applied(order.clone())))
    }
}

//! Cart store: the authoritative line items for the current identity.
//!
//! The in-memory list is the source of truth for the running session. After
//! every mutation the full list is written to the [`KeyValueStore`] under the
//! identity's storage key. A failed write is logged and swallowed; it never
//! rolls back or blocks the mutation.
//!
//! # Identity switch
//!
//! | from | to | effect |
//! |------|----|--------|
//! | user | guest | user's persisted cart copied to `guestCart` and loaded |
//! | any other | any | whatever is persisted under the new key is loaded |

use std::sync::Arc;

use gameshop_core::{ProductId, Quantity, QuantityError, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

/// Storage key of the anonymous cart.
pub const GUEST_CART_KEY: &str = "guestCart";

/// Errors returned by cart mutators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    /// The requested quantity is above the per-line cap.
    #[error("quantity for product {product_id} is invalid: {source}")]
    InvalidQuantity {
        product_id: ProductId,
        #[source]
        source: QuantityError,
    },

    /// The product carries a negative price.
    #[error("product {0} has a negative price")]
    NegativePrice(ProductId),
}

/// Whose cart is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CartIdentity {
    /// Anonymous shopper.
    #[default]
    Guest,
    /// Authenticated user.
    User(UserId),
}

impl CartIdentity {
    /// Storage partition key for this identity.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            Self::Guest => GUEST_CART_KEY.to_string(),
            Self::User(id) => format!("userCart_{id}"),
        }
    }

    /// Whether this identity is an authenticated user.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

/// The product fields a cart line needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
}

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub quantity: Quantity,
}

impl CartLineItem {
    /// `price × quantity` for this line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity.get())
    }
}

/// Line items of the active identity, mirrored to durable storage.
pub struct CartStore {
    storage: Arc<dyn KeyValueStore>,
    identity: CartIdentity,
    items: Vec<CartLineItem>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("identity", &self.identity)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Load the cart persisted for `identity` (empty if none).
    #[must_use]
    pub fn load(storage: Arc<dyn KeyValueStore>, identity: CartIdentity) -> Self {
        let items = read_items(storage.as_ref(), &identity.storage_key());
        Self {
            storage,
            identity,
            items,
        }
    }

    /// The identity whose cart is active.
    #[must_use]
    pub const fn identity(&self) -> CartIdentity {
        self.identity
    }

    /// Current line items, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity.get()).sum()
    }

    /// Sum of `price × quantity` over all lines.
    #[must_use]
    pub fn compute_total(&self) -> Decimal {
        self.items.iter().map(CartLineItem::line_total).sum()
    }

    /// Add one unit of `product`.
    ///
    /// A repeat add increments the existing line, saturating at the per-line
    /// cap; a new product is appended with quantity 1.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NegativePrice`] if the product's price is negative.
    pub fn add_item(&mut self, product: CartProduct) -> Result<(), CartError> {
        if product.price.is_sign_negative() && !product.price.is_zero() {
            return Err(CartError::NegativePrice(product.id));
        }

        if let Some(item) = self.items.iter_mut().find(|item| item.id == product.id) {
            item.quantity = item.quantity.incremented();
        } else {
            self.items.push(CartLineItem {
                id: product.id,
                name: product.name,
                price: product.price,
                image: product.image,
                quantity: Quantity::ONE,
            });
        }

        debug!(product_id = %product.id, "Added item to cart");
        self.persist();
        Ok(())
    }

    /// Remove the line for `product_id`. Absent ids are ignored.
    pub fn remove_item(&mut self, product_id: ProductId) {
        let before = self.items.len();
        self.items.retain(|item| item.id != product_id);
        if self.items.len() != before {
            debug!(product_id = %product_id, "Removed item from cart");
            self.persist();
        }
    }

    /// Replace the quantity of `product_id`.
    ///
    /// Returns `Ok(true)` when a line changed and `Ok(false)` for the no-op
    /// cases: a quantity below one, or a product not in the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] when `new_quantity` exceeds the
    /// per-line cap. The cart is left unchanged.
    pub fn update_quantity(
        &mut self,
        product_id: ProductId,
        new_quantity: i64,
    ) -> Result<bool, CartError> {
        let quantity = match Quantity::new(new_quantity) {
            Ok(quantity) => quantity,
            Err(QuantityError::TooSmall { .. }) => return Ok(false),
            Err(source) => {
                return Err(CartError::InvalidQuantity { product_id, source });
            }
        };

        let Some(item) = self.items.iter_mut().find(|item| item.id == product_id) else {
            return Ok(false);
        };
        item.quantity = quantity;

        debug!(product_id = %product_id, quantity = %quantity, "Updated cart quantity");
        self.persist();
        Ok(true)
    }

    /// Empty the cart and drop its persisted representation.
    pub fn clear(&mut self) {
        self.items.clear();
        let key = self.identity.storage_key();
        if let Err(e) = self.storage.remove(&key) {
            warn!(key = %key, error = %e, "Failed to remove persisted cart");
        }
        debug!(key = %key, "Cleared cart");
    }

    /// Make `identity` the active cart owner.
    ///
    /// On logout (user → guest) the user's cart is carried into the guest
    /// slot. Every other transition loads the new key's persisted cart and
    /// drops the previous in-memory state.
    pub fn switch_identity(&mut self, identity: CartIdentity) {
        if identity == self.identity {
            return;
        }

        let previous = self.identity;
        let new_key = identity.storage_key();

        if previous.is_authenticated() && identity == CartIdentity::Guest {
            let previous_key = previous.storage_key();
            let carried = match self.storage.get(&previous_key) {
                Ok(Some(raw)) => parse_items(&raw, &previous_key),
                Ok(None) => self.items.clone(),
                Err(e) => {
                    warn!(key = %previous_key, error = %e, "Failed to read persisted cart; carrying in-memory items");
                    self.items.clone()
                }
            };

            self.identity = identity;
            self.items = carried;
            self.persist();
            debug!(from = %previous.storage_key(), to = %new_key, items = self.items.len(), "Carried cart over to guest");
        } else {
            self.items = read_items(self.storage.as_ref(), &new_key);
            self.identity = identity;
            debug!(from = %previous.storage_key(), to = %new_key, items = self.items.len(), "Loaded cart for new identity");
        }
    }

    /// Write the full list under the active key.
    fn persist(&self) {
        let key = self.identity.storage_key();
        let result = serde_json::to_string(&self.items)
            .map_err(|e| e.to_string())
            .and_then(|json| self.storage.set(&key, &json).map_err(|e| e.to_string()));
        if let Err(error) = result {
            warn!(key = %key, error = %error, "Failed to persist cart; keeping in-memory state");
        }
    }
}

/// Read and decode the cart under `key`, treating absence or corruption as empty.
fn read_items(storage: &dyn KeyValueStore, key: &str) -> Vec<CartLineItem> {
    match storage.get(key) {
        Ok(Some(raw)) => parse_items(&raw, key),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read persisted cart");
            Vec::new()
        }
    }
}

fn parse_items(raw: &str, key: &str) -> Vec<CartLineItem> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(key = %key, error = %e, "Discarding unreadable persisted cart");
        Vec::new()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::tests::FaultyStore;
    use crate::storage::{MemoryStore, StorageError};

    fn product(id: i32, price_cents: i64) -> CartProduct {
        CartProduct {
            id: ProductId::new(id),
            name: format!("Game {id}"),
            price: Decimal::new(price_cents, 2),
            image: None,
        }
    }

    fn persisted(storage: &MemoryStore, key: &str) -> Vec<CartLineItem> {
        storage
            .get(key)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
            .unwrap_or_default()
    }

    fn guest_store() -> (Arc<MemoryStore>, CartStore) {
        let storage = Arc::new(MemoryStore::new());
        let cart = CartStore::load(storage.clone(), CartIdentity::Guest);
        (storage, cart)
    }

    #[test]
    fn test_storage_keys() {
        assert_eq!(CartIdentity::Guest.storage_key(), "guestCart");
        assert_eq!(
            CartIdentity::User(UserId::new(42)).storage_key(),
            "userCart_42"
        );
    }

    #[test]
    fn test_add_item_appends_then_increments() {
        let (_, mut cart) = guest_store();
        cart.add_item(product(1, 1999)).unwrap();
        cart.add_item(product(2, 500)).unwrap();
        cart.add_item(product(1, 1999)).unwrap();

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.items()[0].quantity.get(), 2);
        assert_eq!(cart.items()[1].quantity.get(), 1);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_add_item_saturates_at_cap() {
        let (_, mut cart) = guest_store();
        cart.add_item(product(1, 100)).unwrap();
        cart.update_quantity(ProductId::new(1), 99).unwrap();
        cart.add_item(product(1, 100)).unwrap();
        assert_eq!(cart.items()[0].quantity.get(), 99);
    }

    #[test]
    fn test_add_item_rejects_negative_price() {
        let (_, mut cart) = guest_store();
        assert_eq!(
            cart.add_item(product(3, -1)),
            Err(CartError::NegativePrice(ProductId::new(3)))
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_persisted_matches_memory_after_every_mutation() {
        let (storage, mut cart) = guest_store();

        cart.add_item(product(1, 1000)).unwrap();
        assert_eq!(persisted(&storage, GUEST_CART_KEY), cart.items());
        cart.add_item(product(2, 250)).unwrap();
        assert_eq!(persisted(&storage, GUEST_CART_KEY), cart.items());
        cart.add_item(product(1, 1000)).unwrap();
        assert_eq!(persisted(&storage, GUEST_CART_KEY), cart.items());
        cart.update_quantity(ProductId::new(2), 7).unwrap();
        assert_eq!(persisted(&storage, GUEST_CART_KEY), cart.items());
        cart.remove_item(ProductId::new(1));
        assert_eq!(persisted(&storage, GUEST_CART_KEY), cart.items());
        cart.remove_item(ProductId::new(99));
        assert_eq!(persisted(&storage, GUEST_CART_KEY), cart.items());
    }

    #[test]
    fn test_update_quantity_below_one_is_noop() {
        let (_, mut cart) = guest_store();
        cart.add_item(product(1, 1000)).unwrap();
        assert_eq!(cart.update_quantity(ProductId::new(1), 0), Ok(false));
        assert_eq!(cart.update_quantity(ProductId::new(1), -5), Ok(false));
        assert_eq!(cart.items()[0].quantity.get(), 1);
    }

    #[test]
    fn test_update_quantity_above_cap_is_rejected() {
        let (_, mut cart) = guest_store();
        cart.add_item(product(1, 1000)).unwrap();
        let err = cart.update_quantity(ProductId::new(1), 100).unwrap_err();
        assert!(matches!(
            err,
            CartError::InvalidQuantity {
                source: QuantityError::TooLarge { .. },
                ..
            }
        ));
        assert_eq!(cart.items()[0].quantity.get(), 1);
    }

    #[test]
    fn test_update_quantity_unknown_product_is_noop() {
        let (_, mut cart) = guest_store();
        assert_eq!(cart.update_quantity(ProductId::new(5), 3), Ok(false));
    }

    #[test]
    fn test_compute_total_exact_and_idempotent() {
        let (_, mut cart) = guest_store();
        cart.add_item(product(1, 1999)).unwrap();
        cart.add_item(product(2, 1)).unwrap();
        cart.update_quantity(ProductId::new(1), 3).unwrap();

        let expected = Decimal::new(5998, 2);
        assert_eq!(cart.compute_total(), expected);
        assert_eq!(cart.compute_total(), expected);
    }

    #[test]
    fn test_clear_removes_persisted_cart() {
        let (storage, mut cart) = guest_store();
        cart.add_item(product(1, 1000)).unwrap();
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(storage.get(GUEST_CART_KEY).unwrap(), None);
    }

    #[test]
    fn test_logout_carries_user_cart_into_guest_slot() {
        let storage = Arc::new(MemoryStore::new());
        let user = CartIdentity::User(UserId::new(42));
        let mut cart = CartStore::load(storage.clone(), user);
        cart.add_item(product(1, 1000)).unwrap();
        cart.add_item(product(2, 2000)).unwrap();
        let user_items = cart.items().to_vec();

        cart.switch_identity(CartIdentity::Guest);

        assert_eq!(cart.identity(), CartIdentity::Guest);
        assert_eq!(cart.items(), user_items.as_slice());
        assert_eq!(persisted(&storage, "guestCart"), user_items);
        assert_eq!(persisted(&storage, "userCart_42"), user_items);
    }

    #[test]
    fn test_logout_with_unreadable_user_cart_carries_memory() {
        let storage = Arc::new(FaultyStore {
            unreadable: vec!["userCart_42"],
            ..FaultyStore::default()
        });
        let mut cart = CartStore::load(storage.clone(), CartIdentity::User(UserId::new(42)));
        cart.add_item(product(1, 1000)).unwrap();
        let user_items = cart.items().to_vec();

        cart.switch_identity(CartIdentity::Guest);

        assert_eq!(cart.items(), user_items.as_slice());
        assert_eq!(persisted(&storage.inner, "guestCart"), user_items);
    }

    #[test]
    fn test_login_loads_user_cart_without_migration() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = CartStore::load(storage.clone(), CartIdentity::Guest);
        cart.add_item(product(1, 1000)).unwrap();

        cart.switch_identity(CartIdentity::User(UserId::new(7)));

        assert!(cart.is_empty());
        assert_eq!(persisted(&storage, "guestCart").len(), 1);
    }

    #[test]
    fn test_corrupt_persisted_cart_loads_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(GUEST_CART_KEY, "{not json").unwrap();
        let cart = CartStore::load(storage, CartIdentity::Guest);
        assert!(cart.is_empty());
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Poisoned)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }
    }

    #[test]
    fn test_storage_failures_keep_memory_authoritative() {
        let mut cart = CartStore::load(Arc::new(FailingStore), CartIdentity::Guest);
        cart.add_item(product(1, 1000)).unwrap();
        cart.add_item(product(1, 1000)).unwrap();
        assert_eq!(cart.items()[0].quantity.get(), 2);
        assert_eq!(cart.compute_total(), Decimal::from(20));

        cart.clear();
        assert!(cart.is_empty());
    }
}

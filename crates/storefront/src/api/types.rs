//! Request and response shapes of the backend REST API.

use chrono::{DateTime, Utc};
use gameshop_core::{CategoryId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::CartProduct;

/// Image shown when a product has none, or when its fetch timed out.
pub const PLACEHOLDER_IMAGE: &str = "/images/default-product.png";

// =============================================================================
// Catalog
// =============================================================================

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Category reference on a product: either nested or a bare id, depending
/// on the serializer the endpoint uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Nested(Category),
    Id(CategoryId),
}

impl CategoryRef {
    /// The referenced category's id.
    #[must_use]
    pub const fn id(&self) -> CategoryId {
        match self {
            Self::Nested(category) => category.id,
            Self::Id(id) => *id,
        }
    }
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub regular_price: Option<Decimal>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub slug: Option<String>,
}

impl Product {
    /// Image reference, or the placeholder when the product has none.
    #[must_use]
    pub fn image_or_placeholder(&self) -> &str {
        self.image
            .as_deref()
            .filter(|image| !image.is_empty())
            .unwrap_or(PLACEHOLDER_IMAGE)
    }

    /// Whether the product sells below its regular price.
    #[must_use]
    pub fn is_discounted(&self) -> bool {
        self.regular_price
            .is_some_and(|regular| regular > self.price)
    }

    /// Whether any units are in stock.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

impl From<&Product> for CartProduct {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
            image: product.image.clone(),
        }
    }
}

/// One page of a catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<Product>,
}

/// Catalog listing filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub search: Option<String>,
    pub category: Option<CategoryId>,
    pub exclude: Option<ProductId>,
}

impl ProductQuery {
    /// Query-string pairs for this filter, in a stable order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.to_string()));
        }
        if let Some(exclude) = self.exclude {
            pairs.push(("exclude", exclude.to_string()));
        }
        pairs
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Shipping block of an order payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPayload {
    pub full_name: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// One line of an order payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemPayload {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

/// Body of the order-creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub shipping_info: ShippingPayload,
    pub items: Vec<OrderItemPayload>,
    pub payment_method: PaymentMethod,
    pub payment_reference: String,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub service_fee: Decimal,
    pub total_price: Decimal,
    pub return_url: String,
    pub cancel_url: String,
}

/// Response of a successful order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Present when the provider still needs the shopper to approve payment.
    #[serde(default)]
    pub payment_url: Option<String>,
}

/// An order in the shopper's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    #[serde(default)]
    pub order_id: Option<String>,
    pub sub_total: Decimal,
    #[serde(default)]
    pub shipping: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub service_fee: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub order_status: OrderStatus,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Order history, paginated or plain depending on backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OrderList {
    Page { results: Vec<OrderRecord> },
    Plain(Vec<OrderRecord>),
}

impl OrderList {
    pub(crate) fn into_records(self) -> Vec<OrderRecord> {
        match self {
            Self::Page { results } | Self::Plain(results) => results,
        }
    }
}

// =============================================================================
// Auth
// =============================================================================

/// Body of the token request.
#[derive(Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Response of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedTokens {
    pub access: String,
    pub refresh: String,
}

/// Body of the token refresh request.
#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Response of the token refresh endpoint. `refresh` is only present when
/// the backend rotates refresh tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

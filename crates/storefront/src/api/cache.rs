//! Cache types for catalog responses.

use gameshop_core::ProductId;

use super::types::{Product, ProductPage, ProductQuery};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Products(ProductQuery),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(ProductPage),
}

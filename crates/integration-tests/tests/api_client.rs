//! Integration tests for the backend API client.
//!
//! Run with: cargo test -p gameshop-integration-tests --test api_client

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use gameshop_core::{CategoryId, ProductId};
use gameshop_integration_tests::FakeBackend;
use gameshop_storefront::api::{ApiClient, ApiError, ProductQuery};
use gameshop_storefront::config::StorefrontConfig;
use rust_decimal::Decimal;

#[tokio::test]
async fn test_list_products_filters_by_search() {
    let backend = FakeBackend::spawn().await;
    let client = ApiClient::new(&backend.config()).unwrap();

    let query = ProductQuery {
        search: Some("elden".to_string()),
        ..ProductQuery::default()
    };
    let page = client.list_products(&query).await.unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].name, "Elden Ring");
    assert!(page.results[0].is_discounted());
}

#[tokio::test]
async fn test_catalog_reads_are_cached() {
    let backend = FakeBackend::spawn().await;
    let client = ApiClient::new(&backend.config()).unwrap();

    let first = client.get_product(ProductId::new(1)).await.unwrap();
    let second = client.get_product(ProductId::new(1)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.price, Decimal::new(1500, 2));
    assert_eq!(backend.recorded().catalog_hits, 1);

    client.invalidate_catalog();
    client.get_product(ProductId::new(1)).await.unwrap();
    assert_eq!(backend.recorded().catalog_hits, 2);
}

#[tokio::test]
async fn test_related_products_share_category_and_exclude_self() {
    let backend = FakeBackend::spawn().await;
    let client = ApiClient::new(&backend.config()).unwrap();

    let product = client.get_product(ProductId::new(1)).await.unwrap();
    let related = client.related_products(&product).await.unwrap();
    let ids: Vec<ProductId> = related.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![ProductId::new(3)]);
    assert_eq!(
        related[0].category.as_ref().map(|c| c.id()),
        Some(CategoryId::new(1))
    );
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let backend = FakeBackend::spawn().await;
    let client = ApiClient::new(&backend.config()).unwrap();

    let err = client.get_product(ProductId::new(999)).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_rate_limit_reports_retry_after() {
    let backend = FakeBackend::spawn().await;
    backend.set_rate_limited(true);
    let client = ApiClient::new(&backend.config()).unwrap();

    let err = client
        .list_products(&ProductQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RateLimited(30)));
}

#[tokio::test]
async fn test_slow_product_falls_back_to_placeholder() {
    let backend = FakeBackend::spawn().await;
    backend.set_product_delay(Some(Duration::from_secs(3)));
    let client = ApiClient::new(&backend.config()).unwrap();

    let started = std::time::Instant::now();
    assert!(client.product_or_placeholder(ProductId::new(2)).await.is_none());
    assert!(started.elapsed() < Duration::from_secs(3));

    backend.set_product_delay(None);
    let product = client.product_or_placeholder(ProductId::new(2)).await.unwrap();
    assert_eq!(product.image_or_placeholder(), "/images/default-product.png");
}

#[tokio::test]
async fn test_every_request_carries_a_unique_request_id() {
    let backend = FakeBackend::spawn().await;
    let client = ApiClient::new(&backend.config()).unwrap();

    client.get_product(ProductId::new(1)).await.unwrap();
    client.get_product(ProductId::new(2)).await.unwrap();

    let ids = backend.recorded().request_ids;
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(ids[0].len(), 36);
}

#[tokio::test]
async fn test_ping_distinguishes_unreachable_backend() {
    let backend = FakeBackend::spawn().await;
    let client = ApiClient::new(&backend.config()).unwrap();
    client.ping().await.unwrap();

    let mut config = StorefrontConfig::with_api_url("http://127.0.0.1:9/api/").unwrap();
    config.catalog_timeout = Duration::from_secs(1);
    let offline = ApiClient::new(&config).unwrap();
    let err = offline.ping().await.unwrap_err();
    assert!(err.is_network());
}

//! `ApiClient` implementation.

use std::sync::Arc;
use std::time::Duration;

use gameshop_core::{OrderId, ProductId};
use moka::future::Cache;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::ApiError;
use super::FieldErrors;
use super::cache::{CacheKey, CacheValue};
use super::types::{
    CreatedOrder, IssuedTokens, OrderList, OrderPayload, OrderRecord, Product, ProductPage,
    ProductQuery, RefreshRequest, RefreshedTokens, TokenRequest,
};
use crate::config::StorefrontConfig;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest slice of a response body kept in logs and error messages.
const BODY_PREVIEW_CHARS: usize = 200;

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the backend REST API.
///
/// Cheap to clone. Catalog reads are cached for 5 minutes; order and token
/// calls always hit the backend.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base: Url,
    catalog_timeout: Duration,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.inner.base.as_str())
            .field("catalog_timeout", &self.inner.catalog_timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &StorefrontConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base: config.api_url.clone(),
                catalog_timeout: config.catalog_timeout,
                cache,
            }),
        })
    }

    /// Root URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base.join(path)?)
    }

    /// Send a request and decode a JSON success body.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let response = request
            .header(REQUEST_ID_HEADER, &request_id)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Body as text first for better error diagnostics
        let body = response.text().await.map_err(ApiError::from_transport)?;

        if !status.is_success() {
            warn!(
                status = %status,
                request_id = %request_id,
                body = %preview(&body),
                "Backend returned non-success status"
            );
            return Err(error_for_status(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                request_id = %request_id,
                body = %preview(&body),
                "Failed to parse backend response"
            );
            ApiError::Parse(e)
        })
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// List catalog products matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage, ApiError> {
        let cache_key = CacheKey::Products(query.clone());
        if let Some(CacheValue::Products(page)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product listing");
            return Ok(page);
        }

        let mut url = self.endpoint("products/")?;
        let pairs = query.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let page: ProductPage = self.execute(self.inner.client.get(url)).await?;
        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(page.clone()))
            .await;
        Ok(page)
    }

    /// Get a single product.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for unknown ids, or another error if the
    /// request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        let cache_key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let url = self.endpoint(&format!("products/{id}/"))?;
        let product: Product = self.execute(self.inner.client.get(url)).await?;
        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Products sharing `product`'s category, excluding `product` itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing request fails.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn related_products(&self, product: &Product) -> Result<Vec<Product>, ApiError> {
        let Some(category) = product.category.as_ref() else {
            return Ok(Vec::new());
        };
        let query = ProductQuery {
            category: Some(category.id()),
            exclude: Some(product.id),
            ..ProductQuery::default()
        };
        let page = self.list_products(&query).await?;
        Ok(page
            .results
            .into_iter()
            .filter(|related| related.id != product.id)
            .collect())
    }

    /// Fetch a product for display, giving up after the catalog timeout.
    ///
    /// Returns `None` on timeout or failure so the caller can fall back to a
    /// placeholder instead of leaving a loading state up indefinitely.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product_or_placeholder(&self, id: ProductId) -> Option<Product> {
        match tokio::time::timeout(self.inner.catalog_timeout, self.get_product(id)).await {
            Ok(Ok(product)) => Some(product),
            Ok(Err(e)) => {
                warn!(error = %e, "Product fetch failed, using placeholder");
                None
            }
            Err(_) => {
                warn!(
                    timeout = ?self.inner.catalog_timeout,
                    "Product fetch timed out, using placeholder"
                );
                None
            }
        }
    }

    /// Drop every cached catalog response.
    pub fn invalidate_catalog(&self) {
        self.inner.cache.invalidate_all();
    }

    /// Check that the backend answers at all.
    ///
    /// Any HTTP status counts as reachable; only transport failures and the
    /// catalog timeout count as down.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when the backend cannot be reached.
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), ApiError> {
        let url = self.endpoint("products/")?;
        self.inner
            .client
            .head(url)
            .timeout(self.inner.catalog_timeout)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Submit an order.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] with the backend's field errors when
    /// the payload is rejected, or another error if the request fails.
    #[instrument(skip(self, payload, token), fields(items = payload.items.len(), total = %payload.total_price))]
    pub async fn create_order(
        &self,
        payload: &OrderPayload,
        token: Option<&SecretString>,
    ) -> Result<CreatedOrder, ApiError> {
        let url = self.endpoint("orders/")?;
        let request = with_bearer(self.inner.client.post(url).json(payload), token);
        let created: CreatedOrder = self.execute(request).await?;
        debug!(order_id = %created.order_id, "Order created");
        Ok(created)
    }

    /// The authenticated shopper's order history.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] without a valid token, or another
    /// error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn list_orders(&self, token: &SecretString) -> Result<Vec<OrderRecord>, ApiError> {
        let url = self.endpoint("orders/")?;
        let list: OrderList = self
            .execute(with_bearer(self.inner.client.get(url), Some(token)))
            .await?;
        Ok(list.into_records())
    }

    /// A single order from the shopper's history.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for unknown ids, or another error if the
    /// request fails.
    #[instrument(skip(self, token), fields(order_id = %id))]
    pub async fn get_order(&self, id: OrderId, token: &SecretString) -> Result<OrderRecord, ApiError> {
        let url = self.endpoint(&format!("orders/{id}/"))?;
        self.execute(with_bearer(self.inner.client.get(url), Some(token)))
            .await
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Obtain a token pair for username/password credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] for wrong credentials.
    #[instrument(skip(self, password))]
    pub async fn obtain_token(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<IssuedTokens, ApiError> {
        let url = self.endpoint("token/")?;
        let body = TokenRequest {
            username,
            password: password.expose_secret(),
        };
        self.execute(self.inner.client.post(url).json(&body)).await
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] when the refresh token is rejected.
    #[instrument(skip(self, refresh))]
    pub async fn refresh_token(&self, refresh: &SecretString) -> Result<RefreshedTokens, ApiError> {
        let url = self.endpoint("token/refresh/")?;
        let body = RefreshRequest {
            refresh: refresh.expose_secret(),
        };
        self.execute(self.inner.client.post(url).json(&body)).await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn with_bearer(
    request: reqwest::RequestBuilder,
    token: Option<&SecretString>,
) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token.expose_secret()),
        None => request,
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// Map a non-success status and body to an [`ApiError`].
fn error_for_status(status: StatusCode, body: &str) -> ApiError {
    let fields = FieldErrors::from_body(body);
    let detail = || {
        fields
            .summary()
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
    };

    match status {
        StatusCode::BAD_REQUEST => ApiError::Validation(fields.clone()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(detail()),
        StatusCode::NOT_FOUND => ApiError::NotFound(detail()),
        _ => ApiError::Server {
            status: status.as_u16(),
            message: detail(),
        },
    }
}

//! Integration tests for the Game Shop storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p gameshop-integration-tests
//! ```
//!
//! No external services are needed: [`FakeBackend`] serves the subset of the
//! backend REST API the storefront uses from an in-process `axum` router bound
//! to an ephemeral port.
//!
//! # Test Categories
//!
//! - `api_client` - catalog reads, caching, error mapping, request ids
//! - `checkout_flow` - login, cart, and checkout end to end
//! - `cart_persistence` - file-backed carts across restarts and identity switches

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gameshop_storefront::config::StorefrontConfig;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Credentials the fake token endpoint accepts.
pub const USERNAME: &str = "player";
pub const PASSWORD: &str = "hunter2";
/// User id carried by issued access tokens.
pub const USER_ID: i32 = 42;
/// The only refresh token the fake accepts.
pub const REFRESH_TOKEN: &str = "refresh-token";

/// Unsigned JWT with the claims the storefront reads.
#[must_use]
pub fn jwt(user_id: i32, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({ "user_id": user_id, "exp": exp, "email": "player@example.com" }).to_string(),
    );
    format!("{header}.{payload}.sig")
}

/// Unix timestamp `secs` from now (negative for the past).
#[must_use]
pub fn unix_in(secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + secs
}

/// How the fake answers order creation.
#[derive(Debug, Clone)]
pub enum OrderReply {
    Created,
    /// Created, but the payment still needs approval at this URL.
    NeedsApproval(String),
    Rejected(StatusCode, Value),
}

/// What the fake has seen.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    /// Number of product list/detail requests served.
    pub catalog_hits: usize,
    /// `(authorization header, body)` of every order creation attempt.
    pub orders: Vec<(Option<String>, Value)>,
    /// `x-request-id` of every request, in arrival order.
    pub request_ids: Vec<String>,
    pub refreshes: usize,
}

struct Backend {
    products: Vec<Value>,
    order_reply: Mutex<OrderReply>,
    product_delay: Mutex<Option<Duration>>,
    rate_limited: Mutex<bool>,
    access_token: Mutex<Option<String>>,
    recorded: Mutex<Recorded>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Backend {
    fn record_request(&self, headers: &HeaderMap) {
        if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
            lock(&self.recorded).request_ids.push(id.to_string());
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = lock(&self.access_token)
            .as_ref()
            .map(|token| format!("Bearer {token}"));
        let given = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        expected.is_some() && expected == given
    }

    fn issue_access(&self) -> String {
        let access = jwt(USER_ID, unix_in(3600));
        *lock(&self.access_token) = Some(access.clone());
        access
    }
}

/// In-process fake of the backend REST API.
pub struct FakeBackend {
    addr: SocketAddr,
    backend: Arc<Backend>,
}

impl FakeBackend {
    /// Start the fake on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn spawn() -> Self {
        let backend = Arc::new(Backend {
            products: vec![
                json!({"id": 1, "name": "Hollow Knight", "price": "15.00", "stock": 12,
                       "category": {"id": 1, "title": "Indie", "slug": "indie"},
                       "image": "/media/products/hollow-knight.png"}),
                json!({"id": 2, "name": "Elden Ring", "price": "60.00", "regular_price": "69.99",
                       "stock": 3, "category": {"id": 2, "title": "RPG", "slug": "rpg"}}),
                json!({"id": 3, "name": "Celeste", "price": "10.00", "stock": 0,
                       "category": {"id": 1, "title": "Indie", "slug": "indie"}}),
            ],
            order_reply: Mutex::new(OrderReply::Created),
            product_delay: Mutex::new(None),
            rate_limited: Mutex::new(false),
            access_token: Mutex::new(None),
            recorded: Mutex::new(Recorded::default()),
        });

        let app = Router::new()
            .route("/api/products/", get(list_products))
            .route("/api/products/{id}/", get(get_product))
            .route("/api/orders/", get(list_orders).post(create_order))
            .route("/api/orders/{id}/", get(get_order))
            .route("/api/token/", post(obtain_token))
            .route("/api/token/refresh/", post(refresh_token))
            .with_state(Arc::clone(&backend));

        #[allow(clippy::unwrap_used)]
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        #[allow(clippy::unwrap_used)]
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, backend }
    }

    /// API root the storefront should use.
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("http://{}/api/", self.addr)
    }

    /// Storefront configuration pointed at this fake, with a 1 s catalog timeout.
    ///
    /// # Panics
    ///
    /// Panics if the URL is rejected, which would be a harness bug.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        #[allow(clippy::unwrap_used)]
        let mut config = StorefrontConfig::with_api_url(&self.api_url()).unwrap();
        config.catalog_timeout = Duration::from_secs(1);
        config
    }

    pub fn set_order_reply(&self, reply: OrderReply) {
        *lock(&self.backend.order_reply) = reply;
    }

    pub fn set_product_delay(&self, delay: Option<Duration>) {
        *lock(&self.backend.product_delay) = delay;
    }

    pub fn set_rate_limited(&self, limited: bool) {
        *lock(&self.backend.rate_limited) = limited;
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn recorded(&self) -> Recorded {
        lock(&self.backend.recorded).clone()
    }
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshBody {
    refresh: String,
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn list_products(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    backend.record_request(&headers);
    if *lock(&backend.rate_limited) {
        let mut response = detail(StatusCode::TOO_MANY_REQUESTS, "Request was throttled.");
        response
            .headers_mut()
            .insert("Retry-After", HeaderValue::from_static("30"));
        return response;
    }
    lock(&backend.recorded).catalog_hits += 1;

    let search = params.get("search").map(|s| s.to_lowercase());
    let category = params.get("category").and_then(|c| c.parse::<i64>().ok());
    let exclude = params.get("exclude").and_then(|e| e.parse::<i64>().ok());

    let results: Vec<Value> = backend
        .products
        .iter()
        .filter(|p| {
            search.as_ref().is_none_or(|s| {
                p["name"]
                    .as_str()
                    .is_some_and(|name| name.to_lowercase().contains(s))
            })
        })
        .filter(|p| category.is_none_or(|c| p["category"]["id"].as_i64() == Some(c)))
        .filter(|p| exclude.is_none_or(|e| p["id"].as_i64() != Some(e)))
        .cloned()
        .collect();

    Json(json!({
        "count": results.len(),
        "next": null,
        "previous": null,
        "results": results,
    }))
    .into_response()
}

async fn get_product(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    backend.record_request(&headers);
    let delay = *lock(&backend.product_delay);
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    lock(&backend.recorded).catalog_hits += 1;

    backend
        .products
        .iter()
        .find(|p| p["id"].as_i64() == Some(id))
        .map_or_else(
            || detail(StatusCode::NOT_FOUND, "No Product matches the given query."),
            |p| Json(p.clone()).into_response(),
        )
}

async fn create_order(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record_request(&headers);
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let number = {
        let mut recorded = lock(&backend.recorded);
        recorded.orders.push((authorization, body));
        recorded.orders.len()
    };

    if !backend.authorized(&headers) {
        return detail(
            StatusCode::UNAUTHORIZED,
            "Authentication credentials were not provided.",
        );
    }

    let reply = lock(&backend.order_reply).clone();
    match reply {
        OrderReply::Created => (
            StatusCode::CREATED,
            Json(json!({ "order_id": format!("ORD-{}", 1000 + number), "status": "Pending" })),
        )
            .into_response(),
        OrderReply::NeedsApproval(url) => (
            StatusCode::CREATED,
            Json(json!({
                "order_id": format!("ORD-{}", 1000 + number),
                "status": "Pending",
                "payment_url": url,
            })),
        )
            .into_response(),
        OrderReply::Rejected(status, body) => (status, Json(body)).into_response(),
    }
}

fn order_record(id: usize, body: &Value) -> Value {
    json!({
        "id": id,
        "order_id": format!("ORD-{}", 1000 + id),
        "sub_total": body["subtotal"],
        "shipping": body["shipping_cost"],
        "tax": body["tax"],
        "service_fee": body["service_fee"],
        "total": body["total_price"],
        "payment_status": "Paid",
        "order_status": "Pending",
        "payment_method": body["payment_method"],
        "date": "2026-10-17T12:00:00Z",
    })
}

async fn list_orders(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.record_request(&headers);
    if !backend.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Given token not valid for any token type");
    }
    let results: Vec<Value> = lock(&backend.recorded)
        .orders
        .iter()
        .enumerate()
        .map(|(index, (_, body))| order_record(index + 1, body))
        .collect();
    Json(json!({ "results": results })).into_response()
}

async fn get_order(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<usize>,
) -> Response {
    backend.record_request(&headers);
    if !backend.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Given token not valid for any token type");
    }
    let recorded = lock(&backend.recorded);
    match id.checked_sub(1).and_then(|index| recorded.orders.get(index)) {
        Some((_, body)) => Json(order_record(id, body)).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Not found."),
    }
}

async fn obtain_token(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(credentials): Json<Credentials>,
) -> Response {
    backend.record_request(&headers);
    if credentials.username != USERNAME || credentials.password != PASSWORD {
        return detail(
            StatusCode::UNAUTHORIZED,
            "No active account found with the given credentials",
        );
    }
    let access = backend.issue_access();
    Json(json!({ "access": access, "refresh": REFRESH_TOKEN })).into_response()
}

async fn refresh_token(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<RefreshBody>,
) -> Response {
    backend.record_request(&headers);
    if body.refresh != REFRESH_TOKEN {
        return detail(StatusCode::UNAUTHORIZED, "Token is invalid or expired");
    }
    lock(&backend.recorded).refreshes += 1;
    let access = backend.issue_access();
    Json(json!({ "access": access })).into_response()
}

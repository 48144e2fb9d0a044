//! Backend REST API client.
//!
//! # Architecture
//!
//! - `reqwest` for HTTP, JSON bodies via `serde`
//! - The backend is the source of truth for catalog and orders; nothing is synced locally
//! - Catalog reads are cached in memory via `moka` (5 minute TTL)
//! - Every request carries an `x-request-id` header for correlation with backend logs
//!
//! # Example
//!
//! ```rust,ignore
//! use gameshop_storefront::api::{ApiClient, ProductQuery};
//!
//! let client = ApiClient::new(&config)?;
//! let page = client.list_products(&ProductQuery::default()).await?;
//! let product = client.get_product(page.results[0].id).await?;
//! ```

mod cache;
mod client;
pub mod types;

pub use client::{ApiClient, REQUEST_ID_HEADER};
pub use types::*;

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend could not be reached (connection refused, DNS, timeout).
    #[error("Network unavailable: {0}")]
    Network(String),

    /// HTTP request failed for another transport reason.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Building a request URL failed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The backend rejected the request body (HTTP 400).
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// Missing or rejected credentials (HTTP 401/403).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },
}

impl ApiError {
    /// Whether the failure means the backend is unreachable rather than
    /// reachable-but-refusing.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Classify a transport-level `reqwest` failure.
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::Network(error.to_string())
        } else {
            Self::Http(error)
        }
    }
}

/// Field-level validation errors, as returned in a 400 body.
///
/// The backend answers either `{"field": ["message", ...]}` or
/// `{"detail": "message"}`; both shapes land here keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Fields whose message is shown first, in priority order.
    const PRIORITY: [&'static str; 3] = ["tax", "payment_method", "detail"];

    /// Decode an error body. Non-JSON bodies become a single `detail` entry.
    #[must_use]
    pub fn from_body(body: &str) -> Self {
        let mut errors = BTreeMap::new();
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => {
                for (field, value) in map {
                    let messages = messages_of(&value);
                    if !messages.is_empty() {
                        errors.insert(field, messages);
                    }
                }
            }
            Ok(other) => {
                let messages = messages_of(&other);
                if !messages.is_empty() {
                    errors.insert("detail".to_string(), messages);
                }
            }
            Err(_) => {
                let text = body.trim();
                if !text.is_empty() {
                    errors.insert(
                        "detail".to_string(),
                        vec![text.chars().take(200).collect()],
                    );
                }
            }
        }
        Self(errors)
    }

    /// Single-field constructor.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self(errors)
    }

    /// Messages for `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Whether no field carried a message.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(field, messages)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The most specific message for display: a priority field's messages
    /// if present, otherwise the first field in order.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        Self::PRIORITY
            .iter()
            .find_map(|field| self.0.get(*field))
            .or_else(|| self.0.values().next())
            .map(|messages| messages.join(", "))
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(no error details provided)");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

fn messages_of(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items.iter().flat_map(messages_of).collect(),
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Object(map) => map.values().flat_map(messages_of).collect(),
        other => vec![other.to_string()],
    }
}

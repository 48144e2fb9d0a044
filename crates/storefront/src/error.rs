//! Unified error handling with Sentry integration.
//!
//! Provides a unified `StorefrontError` type for every operation the
//! storefront exposes to a front end. Each error maps to a coarse
//! [`ErrorKind`] and a [`user_message`](StorefrontError::user_message) that is
//! safe to show the shopper.

use thiserror::Error;

use crate::api::ApiError;
use crate::auth::AuthError;
use crate::cart::CartError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::payment::PaymentError;
use crate::storage::StorageError;

/// Storefront-level error type.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Backend API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart mutation rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout action rejected.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Payment SDK failure.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Input rejected before reaching the backend.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The shopper must log in.
    #[error("Permission denied: {0}")]
    Permission(String),
}

/// Coarse classification of a [`StorefrontError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    ExternalService,
    NotFound,
    Permission,
    Internal,
}

impl StorefrontError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Storage(_) => ErrorKind::Internal,
            Self::Api(err) | Self::Auth(AuthError::Refresh(err)) => api_kind(err),
            Self::Auth(AuthError::Storage(_)) => ErrorKind::Internal,
            Self::Auth(_) | Self::Permission(_) => ErrorKind::Permission,
            Self::Cart(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Checkout(err) => match err {
                CheckoutError::Validation(_) | CheckoutError::OrderSubmissionFailed { .. } => {
                    ErrorKind::Validation
                }
                CheckoutError::PaymentSdkUnavailable(_) | CheckoutError::NetworkUnavailable(_) => {
                    ErrorKind::ExternalService
                }
            },
            Self::Payment(_) => ErrorKind::ExternalService,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// A message fit for the shopper.
    ///
    /// Internal failures get a generic message; details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) | Self::Storage(_) | Self::Auth(AuthError::Storage(_)) => {
                "Something went wrong, please try again".to_string()
            }
            Self::Api(err) | Self::Auth(AuthError::Refresh(err)) => api_message(err),
            Self::Auth(AuthError::SessionExpired) => {
                "Your session has expired, please log in again".to_string()
            }
            Self::Auth(AuthError::MalformedToken(_)) => {
                "Login failed, please try again".to_string()
            }
            Self::Cart(CartError::InvalidQuantity { .. }) => {
                "Quantity must be between 1 and 99".to_string()
            }
            Self::Cart(CartError::NegativePrice(_)) => {
                "This product cannot be added to the cart".to_string()
            }
            Self::Checkout(CheckoutError::NetworkUnavailable(_)) => {
                "Unable to reach the server. Check your connection and try again".to_string()
            }
            Self::Checkout(err) => err.to_string(),
            Self::Payment(_) => {
                "The payment provider could not be loaded, please try again".to_string()
            }
            Self::Validation(msg) | Self::Permission(msg) => msg.clone(),
            Self::NotFound(what) => format!("{what} could not be found"),
        }
    }

    /// Log the error, capturing internal and external-service failures to
    /// Sentry.
    pub fn report(&self) {
        if matches!(self.kind(), ErrorKind::Internal | ErrorKind::ExternalService) {
            let event_id = sentry::capture_error(self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "Storefront error");
        } else {
            tracing::warn!(error = %self, "Storefront request rejected");
        }
    }
}

const fn api_kind(err: &ApiError) -> ErrorKind {
    match err {
        ApiError::Validation(_) => ErrorKind::Validation,
        ApiError::Unauthorized(_) => ErrorKind::Permission,
        ApiError::NotFound(_) => ErrorKind::NotFound,
        ApiError::Url(_) => ErrorKind::Internal,
        ApiError::Network(_)
        | ApiError::Http(_)
        | ApiError::Parse(_)
        | ApiError::RateLimited(_)
        | ApiError::Server { .. } => ErrorKind::ExternalService,
    }
}

fn api_message(err: &ApiError) -> String {
    match err {
        ApiError::Network(_) => {
            "Unable to reach the server. Check your connection and try again".to_string()
        }
        ApiError::Validation(fields) => fields
            .summary()
            .unwrap_or_else(|| "The request was rejected".to_string()),
        ApiError::Unauthorized(_) => "Please log in to continue".to_string(),
        ApiError::NotFound(_) => "The requested item could not be found".to_string(),
        ApiError::RateLimited(secs) => {
            format!("Too many requests, please try again in {secs} seconds")
        }
        ApiError::Http(_) | ApiError::Parse(_) | ApiError::Server { .. } | ApiError::Url(_) => {
            "External service error".to_string()
        }
    }
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a shopper action.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use gameshop_core::ProductId;

    use super::*;
    use crate::api::FieldErrors;

    #[test]
    fn test_storefront_error_display() {
        let err = StorefrontError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = StorefrontError::Validation("invalid input".to_string());
        assert_eq!(err.to_string(), "Validation error: invalid input");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            StorefrontError::from(ApiError::Network("down".to_string())).kind(),
            ErrorKind::ExternalService
        );
        assert_eq!(
            StorefrontError::from(ApiError::Unauthorized("401".to_string())).kind(),
            ErrorKind::Permission
        );
        assert_eq!(
            StorefrontError::from(AuthError::SessionExpired).kind(),
            ErrorKind::Permission
        );
        assert_eq!(
            StorefrontError::from(CheckoutError::Validation("x".to_string())).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            StorefrontError::from(StorageError::Poisoned).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_user_messages_hide_internals() {
        let err = StorefrontError::from(ApiError::Server {
            status: 500,
            message: "Traceback (most recent call last)".to_string(),
        });
        assert_eq!(err.user_message(), "External service error");

        let err = StorefrontError::from(StorageError::InvalidKey("../etc".to_string()));
        assert!(!err.user_message().contains("etc"));
    }

    #[test]
    fn test_user_messages_are_specific() {
        let fields = FieldErrors::single("payment_method", "Invalid payment method.");
        assert_eq!(
            StorefrontError::from(ApiError::Validation(fields)).user_message(),
            "Invalid payment method."
        );
        assert_eq!(
            StorefrontError::from(ApiError::RateLimited(30)).user_message(),
            "Too many requests, please try again in 30 seconds"
        );
        let quantity = gameshop_core::Quantity::new(100).unwrap_err();
        let err = StorefrontError::from(CartError::InvalidQuantity {
            product_id: ProductId::new(1),
            source: quantity,
        });
        assert_eq!(err.user_message(), "Quantity must be between 1 and 99");
    }
}

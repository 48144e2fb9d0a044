//! Checkout: the Shipping → Payment → Confirmation flow.
//!
//! [`CheckoutOrchestrator`] owns the flow state and talks to the order
//! endpoint through [`OrderApi`]. Totals come from [`PricingPolicy`]; the
//! payload submitted at the end is an [`OrderDraft`] built fresh from the
//! cart on every attempt.

mod orchestrator;
mod pricing;

pub use orchestrator::{
    CheckoutOrchestrator, CheckoutOutcome, CheckoutSettings, ORDERS_PATH, OrderApi, Redirect,
};
pub use pricing::{OrderDraft, OrderTotals, PricingPolicy};

use gameshop_core::Email;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{ApiError, FieldErrors, ShippingPayload};

/// Position in the checkout flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckoutStep {
    #[default]
    Shipping,
    Payment,
    /// Terminal: the order was created and the cart cleared.
    Confirmation,
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shipping => write!(f, "shipping"),
            Self::Payment => write!(f, "payment"),
            Self::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// Shipping details entered on the first step.
///
/// Only `full_name` and `email` are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

impl ShippingInfo {
    /// Check the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] naming the first missing or
    /// malformed field.
    pub fn validate(&self) -> Result<Email, CheckoutError> {
        if self.full_name.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "Please enter your full name".to_string(),
            ));
        }
        if self.email.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "Please enter your email address".to_string(),
            ));
        }
        Email::parse(&self.email)
            .map_err(|e| CheckoutError::Validation(format!("Please enter a valid email address: {e}")))
    }

    pub(crate) fn to_payload(&self) -> ShippingPayload {
        ShippingPayload {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            country: self.country.trim().to_string(),
        }
    }
}

/// Recoverable checkout failures. None of them moves the flow to another step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckoutError {
    /// Input failed a local check.
    #[error("{0}")]
    Validation(String),

    /// The payment SDK is not loaded.
    #[error("Payment provider unavailable: {0}")]
    PaymentSdkUnavailable(String),

    /// The backend refused to create the order.
    #[error("{message}")]
    OrderSubmissionFailed { message: String, fields: FieldErrors },

    /// The backend could not be reached.
    #[error("Unable to reach the server: {0}")]
    NetworkUnavailable(String),
}

impl CheckoutError {
    /// Translate an order-creation failure.
    #[must_use]
    pub fn from_api(error: ApiError) -> Self {
        match error {
            ApiError::Network(reason) => Self::NetworkUnavailable(reason),
            ApiError::Validation(fields) => Self::OrderSubmissionFailed {
                message: fields
                    .summary()
                    .unwrap_or_else(|| "Failed to create order".to_string()),
                fields,
            },
            ApiError::Unauthorized(_) => Self::OrderSubmissionFailed {
                message: "Please log in to place an order".to_string(),
                fields: FieldErrors::default(),
            },
            ApiError::RateLimited(secs) => Self::OrderSubmissionFailed {
                message: format!("Too many requests, please try again in {secs} seconds"),
                fields: FieldErrors::default(),
            },
            ApiError::Server { message, .. } if !message.trim().is_empty() => {
                Self::OrderSubmissionFailed {
                    message,
                    fields: FieldErrors::default(),
                }
            }
            other => {
                tracing::error!(error = %other, "Unexpected order creation failure");
                Self::OrderSubmissionFailed {
                    message: "Failed to create order, please try again".to_string(),
                    fields: FieldErrors::default(),
                }
            }
        }
    }
}

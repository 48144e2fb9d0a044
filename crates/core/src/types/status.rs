//! Status enums for orders and payments.

use serde::{Deserialize, Serialize};

/// Order fulfillment status, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Fulfilled,
    Canceled,
    /// A status this client does not know about yet.
    #[serde(other)]
    Unknown,
}

/// Payment status of an order, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Processing,
    Paid,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Payment method chosen on the payment step.
///
/// Serialized with the lowercase names the order endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "paypal", alias = "PayPal")]
    PayPal,
    #[serde(alias = "Credit_Card")]
    CreditCard,
    #[serde(alias = "Stripe")]
    Stripe,
}

impl PaymentMethod {
    /// Wire name sent to the order endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PayPal => "paypal",
            Self::CreditCard => "credit_card",
            Self::Stripe => "stripe",
        }
    }

    /// Whether this method is captured through the hosted payment SDK.
    #[must_use]
    pub const fn uses_hosted_sdk(&self) -> bool {
        matches!(self, Self::PayPal)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PayPal => write!(f, "PayPal"),
            Self::CreditCard => write!(f, "Credit Card"),
            Self::Stripe => write!(f, "Stripe"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paypal" => Ok(Self::PayPal),
            "credit_card" | "credit-card" | "card" => Ok(Self::CreditCard),
            "stripe" => Ok(Self::Stripe),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GAMESHOP_API_URL` - Backend REST API root (e.g., `http://127.0.0.1:8000/api/`)
//!
//! ## Optional
//! - `GAMESHOP_BASE_URL` - Public storefront URL used for payment return/cancel links
//!   (default: `http://localhost:3000`)
//! - `GAMESHOP_REQUEST_TIMEOUT_SECS` - Timeout for ordinary API calls (default: 30)
//! - `GAMESHOP_CATALOG_TIMEOUT_SECS` - Timeout for catalog reads feeding loading states (default: 3)
//! - `GAMESHOP_DATA_DIR` - Directory for the persisted cart and tokens (default: `.gameshop`)
//! - `GAMESHOP_TAX_RATE` - Tax rate applied to the subtotal (default: 0.085)
//! - `GAMESHOP_SERVICE_FEE_RATE` - Service fee rate applied to the subtotal (default: 0.05)
//! - `GAMESHOP_SHIPPING_FEE` - Flat shipping fee below the threshold (default: 5.99)
//! - `GAMESHOP_FREE_SHIPPING_THRESHOLD` - Subtotal above which shipping is free (default: 50)
//! - `GAMESHOP_REDIRECT_DELAY_SECS` - Delay before leaving the confirmation step, `0` disables (default: 5)
//! - `PAYPAL_CLIENT_ID` - Enables the hosted payment SDK
//! - `PAYPAL_SDK_URL` - Hosted payment SDK script URL (default: `https://www.paypal.com/sdk/js`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `GAMESHOP_LOG_FORMAT` - `text` or `json` (default: `text`)

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::checkout::PricingPolicy;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_SDK_URL: &str = "https://www.paypal.com/sdk/js";
const DEFAULT_DATA_DIR: &str = ".gameshop";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Backend REST API root, always ending in `/`
    pub api_url: Url,
    /// Public base URL of the storefront
    pub base_url: String,
    /// Timeout for ordinary API calls
    pub request_timeout: Duration,
    /// Timeout for catalog reads that feed visible loading states
    pub catalog_timeout: Duration,
    /// Directory holding the persisted cart and auth tokens
    pub data_dir: PathBuf,
    /// Order total computation rules
    pub pricing: PricingPolicy,
    /// Delay before the confirmation step redirects; `None` disables the redirect
    pub redirect_delay: Option<Duration>,
    /// Hosted payment SDK configuration
    pub payment: PaymentConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
}

/// Hosted payment SDK configuration.
///
/// Implements `Debug` manually to redact the client id.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Provider client id; the hosted SDK is disabled when absent
    pub client_id: Option<SecretString>,
    /// SDK script URL (validated as an absolute URL when loaded from the environment)
    pub sdk_url: String,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field(
                "client_id",
                &self.client_id.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sdk_url", &self.sdk_url)
            .finish()
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            sdk_url: DEFAULT_SDK_URL.to_string(),
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or any
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = normalize_api_url(&get_required_env("GAMESHOP_API_URL")?)
            .map_err(|e| ConfigError::InvalidEnvVar("GAMESHOP_API_URL".to_string(), e))?;
        let base_url = get_env_or_default("GAMESHOP_BASE_URL", DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let request_timeout =
            Duration::from_secs(get_parsed_or_default("GAMESHOP_REQUEST_TIMEOUT_SECS", 30_u64)?);
        let catalog_timeout =
            Duration::from_secs(get_parsed_or_default("GAMESHOP_CATALOG_TIMEOUT_SECS", 3_u64)?);
        let data_dir = PathBuf::from(get_env_or_default("GAMESHOP_DATA_DIR", DEFAULT_DATA_DIR));
        let redirect_delay =
            redirect_delay_from_secs(get_parsed_or_default("GAMESHOP_REDIRECT_DELAY_SECS", 5_u64)?);

        let defaults = PricingPolicy::default();
        let pricing = PricingPolicy {
            tax_rate: get_parsed_or_default("GAMESHOP_TAX_RATE", defaults.tax_rate)?,
            service_fee_rate: get_parsed_or_default(
                "GAMESHOP_SERVICE_FEE_RATE",
                defaults.service_fee_rate,
            )?,
            shipping_fee: get_parsed_or_default("GAMESHOP_SHIPPING_FEE", defaults.shipping_fee)?,
            free_shipping_threshold: get_parsed_or_default(
                "GAMESHOP_FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            )?,
        };
        validate_pricing(&pricing)?;

        let payment = PaymentConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let log_format = get_parsed_or_default("GAMESHOP_LOG_FORMAT", LogFormat::Text)?;

        Ok(Self {
            api_url,
            base_url,
            request_timeout,
            catalog_timeout,
            data_dir,
            pricing,
            redirect_delay,
            payment,
            sentry_dsn,
            log_format,
        })
    }

    /// Configuration pointing at `api_url` with every other setting at its default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `api_url` is not an absolute http(s) URL.
    pub fn with_api_url(api_url: &str) -> Result<Self, ConfigError> {
        let api_url = normalize_api_url(api_url)
            .map_err(|e| ConfigError::InvalidEnvVar("GAMESHOP_API_URL".to_string(), e))?;
        Ok(Self {
            api_url,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            catalog_timeout: Duration::from_secs(3),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            pricing: PricingPolicy::default(),
            redirect_delay: Some(Duration::from_secs(5)),
            payment: PaymentConfig::default(),
            sentry_dsn: None,
            log_format: LogFormat::Text,
        })
    }

    /// URL the payment provider returns to after approval.
    #[must_use]
    pub fn return_url(&self) -> String {
        format!("{}/checkout/success", self.base_url)
    }

    /// URL the payment provider returns to after cancellation.
    #[must_use]
    pub fn cancel_url(&self) -> String {
        format!("{}/checkout/cancel", self.base_url)
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let sdk_url = get_env_or_default("PAYPAL_SDK_URL", DEFAULT_SDK_URL);
        Url::parse(&sdk_url)
            .map_err(|e| ConfigError::InvalidEnvVar("PAYPAL_SDK_URL".to_string(), e.to_string()))?;
        Ok(Self {
            client_id: get_optional_env("PAYPAL_CLIENT_ID")
                .filter(|id| !id.trim().is_empty())
                .map(SecretString::from),
            sdk_url,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse the API root and guarantee a trailing slash so relative joins keep
/// the `/api/` prefix.
fn normalize_api_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{other}'")),
    }
}

const fn redirect_delay_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

fn validate_pricing(pricing: &PricingPolicy) -> Result<(), ConfigError> {
    let checks: [(&str, Decimal); 4] = [
        ("GAMESHOP_TAX_RATE", pricing.tax_rate),
        ("GAMESHOP_SERVICE_FEE_RATE", pricing.service_fee_rate),
        ("GAMESHOP_SHIPPING_FEE", pricing.shipping_fee),
        ("GAMESHOP_FREE_SHIPPING_THRESHOLD", pricing.free_shipping_threshold),
    ];
    for (key, value) in checks {
        if value.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("must not be negative (got {value})"),
            ));
        }
    }
    Ok(())
}

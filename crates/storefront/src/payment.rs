//! Payment SDK adapter.
//!
//! The checkout flow needs the provider's client SDK loaded while the shopper
//! is on the payment step, and released as soon as they leave it. Loading is
//! modelled by [`PaymentSdk`]; the loaded state is held by a
//! [`PaymentSdkGuard`], which unloads on drop.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::PaymentConfig;

/// Payment SDK errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    /// No provider client id is configured.
    #[error("payment provider is not configured")]
    NotConfigured,

    /// The SDK URL is not a valid absolute URL.
    #[error("invalid payment SDK URL: {0}")]
    InvalidUrl(String),

    /// The SDK could not be loaded.
    #[error("payment SDK failed to load: {0}")]
    LoadFailed(String),

    /// Loading did not finish in time.
    #[error("payment SDK did not load within {0:?}")]
    Timeout(Duration),
}

/// A client-side payment SDK that must be loaded before payment can be taken.
pub trait PaymentSdk: Send + Sync {
    /// Load the SDK and wait until it is ready.
    fn load(&self) -> impl Future<Output = Result<(), PaymentError>> + Send;

    /// Release the SDK. Must be safe to call when not loaded.
    fn unload(&self);
}

/// A loaded SDK. Dropping the guard unloads it.
#[derive(Debug)]
pub struct PaymentSdkGuard<P: PaymentSdk> {
    sdk: Arc<P>,
}

impl<P: PaymentSdk> PaymentSdkGuard<P> {
    /// Load `sdk` and hold it loaded until the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns the SDK's load error; nothing is held in that case.
    pub async fn acquire(sdk: Arc<P>) -> Result<Self, PaymentError> {
        sdk.load().await?;
        Ok(Self { sdk })
    }
}

impl<P: PaymentSdk> Drop for PaymentSdkGuard<P> {
    fn drop(&mut self) {
        self.sdk.unload();
    }
}

/// Result of a provider-side capture, handed to checkout confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    /// Provider capture/transaction reference.
    pub reference: String,
    /// Provider capture status, e.g. `COMPLETED`.
    pub status: String,
    #[serde(default)]
    pub payer_email: Option<String>,
}

impl PaymentConfirmation {
    /// A completed capture with the given reference.
    #[must_use]
    pub fn completed(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            status: "COMPLETED".to_string(),
            payer_email: None,
        }
    }

    /// Whether the provider reports the capture as completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("COMPLETED")
    }
}

/// The provider's hosted JavaScript SDK.
///
/// Loading fetches the SDK script for the configured client id; a successful
/// response means the provider accepted the client id and is reachable.
#[derive(Debug)]
pub struct HostedPaymentSdk {
    client: reqwest::Client,
    script_url: Url,
    timeout: Duration,
    loaded: AtomicBool,
}

impl HostedPaymentSdk {
    /// Build the adapter from payment configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotConfigured`] without a client id, or
    /// [`PaymentError::InvalidUrl`] if the SDK URL does not parse.
    pub fn from_config(config: &PaymentConfig, timeout: Duration) -> Result<Self, PaymentError> {
        let client_id = config.client_id.as_ref().ok_or(PaymentError::NotConfigured)?;
        let mut script_url =
            Url::parse(&config.sdk_url).map_err(|e| PaymentError::InvalidUrl(e.to_string()))?;
        script_url
            .query_pairs_mut()
            .append_pair("client-id", client_id.expose_secret())
            .append_pair("currency", "USD");

        Ok(Self {
            client: reqwest::Client::new(),
            script_url,
            timeout,
            loaded: AtomicBool::new(false),
        })
    }

    /// Whether the SDK is currently loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

impl PaymentSdk for HostedPaymentSdk {
    #[instrument(skip(self), fields(host = ?self.script_url.host_str()))]
    async fn load(&self) -> Result<(), PaymentError> {
        if self.is_loaded() {
            return Ok(());
        }

        let request = self.client.get(self.script_url.clone()).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| PaymentError::Timeout(self.timeout))?
            .map_err(|e| PaymentError::LoadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Payment SDK rejected");
            return Err(PaymentError::LoadFailed(format!("provider returned {status}")));
        }

        self.loaded.store(true, Ordering::Release);
        info!("Payment SDK loaded");
        Ok(())
    }

    fn unload(&self) {
        if self.loaded.swap(false, Ordering::AcqRel) {
            debug!("Payment SDK unloaded");
        }
    }
}

/// An always-ready SDK for flows with no client-side provider script.
#[derive(Debug, Default)]
pub struct OfflinePaymentSdk {
    loaded: AtomicBool,
}

impl OfflinePaymentSdk {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the SDK is currently loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

impl PaymentSdk for OfflinePaymentSdk {
    async fn load(&self) -> Result<(), PaymentError> {
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
    }
}

/// The SDK chosen from configuration: hosted when a client id is set.
#[derive(Debug)]
pub enum ConfiguredPaymentSdk {
    Hosted(HostedPaymentSdk),
    Offline(OfflinePaymentSdk),
}

impl ConfiguredPaymentSdk {
    /// Pick the hosted SDK if configured, otherwise the offline one.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::InvalidUrl`] if a client id is set but the SDK
    /// URL is unusable.
    pub fn from_config(config: &PaymentConfig, timeout: Duration) -> Result<Self, PaymentError> {
        match HostedPaymentSdk::from_config(config, timeout) {
            Ok(hosted) => Ok(Self::Hosted(hosted)),
            Err(PaymentError::NotConfigured) => {
                debug!("No payment client id configured, using offline payment SDK");
                Ok(Self::Offline(OfflinePaymentSdk::new()))
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the SDK is currently loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        match self {
            Self::Hosted(sdk) => sdk.is_loaded(),
            Self::Offline(sdk) => sdk.is_loaded(),
        }
    }
}

impl PaymentSdk for ConfiguredPaymentSdk {
    async fn load(&self) -> Result<(), PaymentError> {
        match self {
            Self::Hosted(sdk) => sdk.load().await,
            Self::Offline(sdk) => sdk.load().await,
        }
    }

    fn unload(&self) {
        match self {
            Self::Hosted(sdk) => sdk.unload(),
            Self::Offline(sdk) => sdk.unload(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[tokio::test]
    async fn test_guard_unloads_on_drop() {
        let sdk = Arc::new(OfflinePaymentSdk::new());
        let guard = PaymentSdkGuard::acquire(sdk.clone()).await.unwrap();
        assert!(sdk.is_loaded());
        drop(guard);
        assert!(!sdk.is_loaded());
    }

    #[test]
    fn test_confirmation_status() {
        assert!(PaymentConfirmation::completed("CAP-1").is_completed());
        let pending = PaymentConfirmation {
            reference: "CAP-2".to_string(),
            status: "PENDING".to_string(),
            payer_email: None,
        };
        assert!(!pending.is_completed());
        let lower = PaymentConfirmation {
            status: "completed".to_string(),
            ..pending
        };
        assert!(lower.is_completed());
    }

    #[test]
    fn test_hosted_requires_client_id() {
        let config = PaymentConfig::default();
        assert_eq!(
            HostedPaymentSdk::from_config(&config, Duration::from_secs(1)).unwrap_err(),
            PaymentError::NotConfigured
        );
        let configured =
            ConfiguredPaymentSdk::from_config(&config, Duration::from_secs(1)).unwrap();
        assert!(matches!(configured, ConfiguredPaymentSdk::Offline(_)));
    }

    #[test]
    fn test_hosted_script_url_carries_client_id() {
        let config = PaymentConfig {
            client_id: Some(SecretString::from("sandbox-id")),
            ..PaymentConfig::default()
        };
        let sdk = HostedPaymentSdk::from_config(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(
            sdk.script_url.as_str(),
            "https://www.paypal.com/sdk/js?client-id=sandbox-id&currency=USD"
        );
        assert!(!sdk.is_loaded());
    }

    #[tokio::test]
    async fn test_hosted_load_failure_is_reported() {
        let config = PaymentConfig {
            client_id: Some(SecretString::from("id")),
            sdk_url: "http://127.0.0.1:9/sdk/js".to_string(),
        };
        let sdk = HostedPaymentSdk::from_config(&config, Duration::from_secs(2)).unwrap();
        let err = sdk.load().await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::LoadFailed(_) | PaymentError::Timeout(_)
        ));
        assert!(!sdk.is_loaded());
    }
}

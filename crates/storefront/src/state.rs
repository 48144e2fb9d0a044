//! Application state: the one place the storefront's collaborators live.

use std::sync::Arc;

use gameshop_core::{OrderId, ProductId};
use secrecy::SecretString;
use tracing::{info, instrument};

use crate::api::{ApiClient, ApiError, CreatedOrder, OrderPayload, OrderRecord};
use crate::auth::{AuthError, AuthSession, AuthTokens};
use crate::cart::{CartIdentity, CartProduct, CartStore};
use crate::checkout::{CheckoutOrchestrator, CheckoutSettings, OrderApi};
use crate::config::StorefrontConfig;
use crate::error::{Result, StorefrontError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::payment::ConfiguredPaymentSdk;
use crate::storage::{FileStore, KeyValueStore};

/// Checkout flow wired to this state's collaborators.
pub type Checkout = CheckoutOrchestrator<AuthorizedApi, ConfiguredPaymentSdk>;

/// Application state for one shopper session.
///
/// Owns the configuration, the backend client, durable storage, the auth
/// session and the active cart. Nothing here is global; front ends create
/// one and pass it around.
pub struct AppState {
    config: StorefrontConfig,
    api: ApiClient,
    auth: AuthSession,
    cart: CartStore,
    payment: Arc<ConfiguredPaymentSdk>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("api", &self.api)
            .field("auth", &self.auth)
            .field("cart", &self.cart)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create state backed by a [`FileStore`] in the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or the API
    /// client or payment SDK cannot be configured.
    pub fn init(config: StorefrontConfig) -> Result<Self> {
        let storage = Arc::new(FileStore::open(&config.data_dir)?);
        Self::with_storage(config, storage)
    }

    /// Create state over an arbitrary store. Restores persisted tokens and
    /// loads the cart of the identity they carry.
    ///
    /// # Errors
    ///
    /// Returns an error if the API client or payment SDK cannot be configured.
    pub fn with_storage(config: StorefrontConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let api = ApiClient::new(&config)?;
        let payment = Arc::new(ConfiguredPaymentSdk::from_config(
            &config.payment,
            config.catalog_timeout,
        )?);
        let auth = AuthSession::restore(Arc::clone(&storage));
        let cart = CartStore::load(storage, auth.identity());

        info!(
            identity = %cart.identity().storage_key(),
            items = cart.items().len(),
            "Storefront state initialized"
        );

        Ok(Self {
            config,
            api,
            auth,
            cart,
            payment,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub const fn auth(&self) -> &AuthSession {
        &self.auth
    }

    #[must_use]
    pub const fn cart(&self) -> &CartStore {
        &self.cart
    }

    pub const fn cart_mut(&mut self) -> &mut CartStore {
        &mut self.cart
    }

    /// Log in with issued tokens and switch to the user's cart.
    ///
    /// The guest cart is left in place and not merged.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokens cannot be persisted; the shopper then
    /// stays logged out with the guest cart active.
    pub fn login(&mut self, tokens: AuthTokens) -> Result<()> {
        let claims = tokens.claims().clone();
        self.auth.login(tokens)?;
        self.cart.switch_identity(CartIdentity::User(claims.user_id));
        set_sentry_user(&claims.user_id, claims.email.as_deref());
        Ok(())
    }

    /// Log in with credentials against the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Permission`] for rejected credentials, or
    /// another error if the backend or storage fails.
    #[instrument(skip(self, password))]
    pub async fn login_with_password(&mut self, username: &str, password: &SecretString) -> Result<()> {
        let issued = match self.api.obtain_token(username, password).await {
            Ok(issued) => issued,
            Err(ApiError::Unauthorized(_)) => {
                return Err(StorefrontError::Permission(
                    "Invalid username or password".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        self.login(AuthTokens::new(issued.access, issued.refresh)?)
    }

    /// Log out, carrying the user's cart over to the guest cart.
    pub fn logout(&mut self) {
        self.auth.logout();
        self.cart.switch_identity(CartIdentity::Guest);
        clear_sentry_user();
    }

    /// Fetch a product and add it to the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the product cannot be fetched or the line is full.
    pub async fn add_product(&mut self, id: ProductId) -> Result<()> {
        let product = self.api.get_product(id).await?;
        self.cart.add_item(CartProduct::from(&product))?;
        let product_id = id.to_string();
        add_breadcrumb("cart", "Added item", Some(&[("product_id", product_id.as_str())]));
        Ok(())
    }

    /// Order API carrying a fresh bearer token (none for guests).
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Auth`] if the session expired; the cart is
    /// switched back to the guest cart in that case.
    pub async fn authorized_api(&mut self) -> Result<AuthorizedApi> {
        let token = match self.auth.fresh_access_token(&self.api).await {
            Ok(token) => token,
            Err(AuthError::SessionExpired) => {
                self.cart.switch_identity(CartIdentity::Guest);
                clear_sentry_user();
                return Err(AuthError::SessionExpired.into());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(AuthorizedApi {
            client: self.api.clone(),
            token,
        })
    }

    /// Start a checkout for the current cart.
    ///
    /// Probes the backend first so an unreachable server is reported before
    /// the shopper fills in the form.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or the session expired.
    pub async fn checkout(&mut self) -> Result<Checkout> {
        self.api.ping().await?;
        let api = self.authorized_api().await?;
        Ok(CheckoutOrchestrator::new(
            api,
            Arc::clone(&self.payment),
            CheckoutSettings::from_config(&self.config),
        ))
    }

    /// The logged-in shopper's order history.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Permission`] for guests.
    pub async fn orders(&mut self) -> Result<Vec<OrderRecord>> {
        let token = self.require_token().await?;
        Ok(self.api.list_orders(&token).await?)
    }

    /// One order from the logged-in shopper's history.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Permission`] for guests, or
    /// [`StorefrontError::NotFound`] for unknown ids.
    pub async fn order(&mut self, id: OrderId) -> Result<OrderRecord> {
        let token = self.require_token().await?;
        match self.api.get_order(id, &token).await {
            Err(ApiError::NotFound(_)) => Err(StorefrontError::NotFound(format!("Order {id}"))),
            other => Ok(other?),
        }
    }

    /// Finish a checkout whose payment was approved at the provider after
    /// [`CheckoutOutcome::AwaitingApproval`](crate::checkout::CheckoutOutcome),
    /// possibly in an earlier session. The cart is cleared once the order
    /// shows up in the shopper's history.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Permission`] for guests, or
    /// [`StorefrontError::NotFound`] if the order is not in the history. The
    /// cart is kept in both cases.
    #[instrument(skip(self))]
    pub async fn complete_approved_order(&mut self, order_id: &str) -> Result<OrderRecord> {
        let record = self
            .orders()
            .await?
            .into_iter()
            .find(|record| record.order_id.as_deref() == Some(order_id))
            .ok_or_else(|| StorefrontError::NotFound(format!("Order {order_id}")))?;
        self.cart.clear();
        info!(order_id, "Approved order completed");
        Ok(record)
    }

    async fn require_token(&mut self) -> Result<SecretString> {
        self.authorized_api().await?.token.ok_or_else(|| {
            StorefrontError::Permission("Please log in to view your orders".to_string())
        })
    }
}

/// [`ApiClient`] bound to the current shopper's access token.
#[derive(Clone)]
pub struct AuthorizedApi {
    client: ApiClient,
    token: Option<SecretString>,
}

impl std::fmt::Debug for AuthorizedApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedApi")
            .field("client", &self.client)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl OrderApi for AuthorizedApi {
    async fn create_order(&self, payload: &OrderPayload) -> std::result::Result<CreatedOrder, ApiError> {
        self.client.create_order(payload, self.token.as_ref()).await
    }
}

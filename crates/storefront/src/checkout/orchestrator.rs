//! The checkout state machine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gameshop_core::PaymentMethod;
use tracing::{info, instrument, warn};

use super::{CheckoutError, CheckoutStep, OrderDraft, OrderTotals, PricingPolicy, ShippingInfo};
use crate::api::{ApiError, CreatedOrder, OrderPayload};
use crate::cart::CartStore;
use crate::config::StorefrontConfig;
use crate::payment::{PaymentConfirmation, PaymentSdk, PaymentSdkGuard};

/// Where the shopper is sent after a successful checkout.
pub const ORDERS_PATH: &str = "/orders";

/// The order-creation endpoint, as seen by checkout.
pub trait OrderApi: Send + Sync {
    fn create_order(
        &self,
        payload: &OrderPayload,
    ) -> impl Future<Output = Result<CreatedOrder, ApiError>> + Send;
}

/// Pending navigation once checkout has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    pub path: &'static str,
    pub after: Duration,
}

/// Result of confirming a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The order is placed and the cart has been cleared.
    Placed(CreatedOrder),
    /// The order exists but the provider still needs the shopper's approval
    /// at `approval_url`. The cart is kept until
    /// [`CheckoutOrchestrator::complete_approval`].
    AwaitingApproval {
        order: CreatedOrder,
        approval_url: String,
    },
}

impl CheckoutOutcome {
    #[must_use]
    pub const fn order(&self) -> &CreatedOrder {
        match self {
            Self::Placed(order) | Self::AwaitingApproval { order, .. } => order,
        }
    }
}

/// Checkout settings taken from the storefront configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub pricing: PricingPolicy,
    pub return_url: String,
    pub cancel_url: String,
    /// `None` disables the post-checkout redirect.
    pub redirect_delay: Option<Duration>,
}

impl CheckoutSettings {
    #[must_use]
    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self {
            pricing: config.pricing,
            return_url: config.return_url(),
            cancel_url: config.cancel_url(),
            redirect_delay: config.redirect_delay,
        }
    }
}

/// Drives one checkout from shipping details to a created order.
///
/// The cart is borrowed per call rather than held, so the caller keeps
/// ownership of it between steps. Every failure is recorded and readable via
/// [`current_error`](Self::current_error) until the next successful action.
pub struct CheckoutOrchestrator<A: OrderApi, P: PaymentSdk> {
    api: A,
    sdk: Arc<P>,
    sdk_guard: Option<PaymentSdkGuard<P>>,
    settings: CheckoutSettings,
    step: CheckoutStep,
    shipping: ShippingInfo,
    payment_method: PaymentMethod,
    error: Option<CheckoutError>,
    placed_order: Option<CreatedOrder>,
    awaiting_approval: Option<CreatedOrder>,
}

impl<A: OrderApi, P: PaymentSdk> std::fmt::Debug for CheckoutOrchestrator<A, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("step", &self.step)
            .field("payment_method", &self.payment_method)
            .field("sdk_ready", &self.sdk_guard.is_some())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<A: OrderApi, P: PaymentSdk> CheckoutOrchestrator<A, P> {
    #[must_use]
    pub fn new(api: A, sdk: Arc<P>, settings: CheckoutSettings) -> Self {
        Self {
            api,
            sdk,
            sdk_guard: None,
            settings,
            step: CheckoutStep::Shipping,
            shipping: ShippingInfo::default(),
            payment_method: PaymentMethod::default(),
            error: None,
            placed_order: None,
            awaiting_approval: None,
        }
    }

    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    /// The most recent failure, cleared by the next successful action.
    #[must_use]
    pub const fn current_error(&self) -> Option<&CheckoutError> {
        self.error.as_ref()
    }

    #[must_use]
    pub const fn shipping_info(&self) -> &ShippingInfo {
        &self.shipping
    }

    #[must_use]
    pub const fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    /// Whether the payment SDK is loaded.
    #[must_use]
    pub const fn sdk_ready(&self) -> bool {
        self.sdk_guard.is_some()
    }

    /// The order created on confirmation.
    #[must_use]
    pub const fn placed_order(&self) -> Option<&CreatedOrder> {
        self.placed_order.as_ref()
    }

    /// The order waiting for provider approval, if any.
    #[must_use]
    pub const fn awaiting_approval(&self) -> Option<&CreatedOrder> {
        self.awaiting_approval.as_ref()
    }

    /// Totals the shopper would be charged for the current cart.
    #[must_use]
    pub fn totals(&self, cart: &CartStore) -> OrderTotals {
        self.settings.pricing.totals_for(cart.items())
    }

    /// Pending navigation to order history, once confirmed and if enabled.
    #[must_use]
    pub fn redirect(&self) -> Option<Redirect> {
        if self.step != CheckoutStep::Confirmation {
            return None;
        }
        self.settings.redirect_delay.map(|after| Redirect {
            path: ORDERS_PATH,
            after,
        })
    }

    /// Submit shipping details and move to the payment step.
    ///
    /// The entered details are kept even when rejected. Entering the payment
    /// step loads the payment SDK; a load failure does not undo the step
    /// change but is recorded as the current error (see
    /// [`retry_payment_sdk`](Self::retry_payment_sdk)).
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] if not on the shipping step, the
    /// cart is empty, or a required field is missing.
    #[instrument(skip_all, fields(step = %self.step))]
    pub async fn advance_from_shipping(
        &mut self,
        cart: &CartStore,
        info: ShippingInfo,
    ) -> Result<(), CheckoutError> {
        if self.step != CheckoutStep::Shipping {
            return self.fail(CheckoutError::Validation(
                "Shipping details can only be entered on the shipping step".to_string(),
            ));
        }
        self.shipping = info;
        if cart.is_empty() {
            return self.fail(CheckoutError::Validation("Your cart is empty".to_string()));
        }
        if let Err(e) = self.shipping.validate() {
            return self.fail(e);
        }

        self.error = None;
        self.step = CheckoutStep::Payment;
        info!("Shipping details accepted");
        self.load_sdk().await;
        Ok(())
    }

    /// Choose how to pay.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] outside the payment step.
    pub fn select_payment_method(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        if self.step != CheckoutStep::Payment {
            return self.fail(CheckoutError::Validation(
                "A payment method can only be chosen on the payment step".to_string(),
            ));
        }
        self.payment_method = method;
        Ok(())
    }

    /// Return to the shipping step, releasing the payment SDK.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] outside the payment step.
    pub fn back_to_shipping(&mut self) -> Result<(), CheckoutError> {
        if self.step != CheckoutStep::Payment {
            return self.fail(CheckoutError::Validation(
                "Can only go back to shipping from the payment step".to_string(),
            ));
        }
        if let Some(order) = self.awaiting_approval.take() {
            info!(order_id = %order.order_id, "Abandoned order awaiting approval");
        }
        self.sdk_guard = None;
        self.error = None;
        self.step = CheckoutStep::Shipping;
        Ok(())
    }

    /// Try loading the payment SDK again after a failed load.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] outside the payment step, or
    /// [`CheckoutError::PaymentSdkUnavailable`] if loading fails again.
    pub async fn retry_payment_sdk(&mut self) -> Result<(), CheckoutError> {
        if self.step != CheckoutStep::Payment {
            return self.fail(CheckoutError::Validation(
                "The payment provider is only loaded on the payment step".to_string(),
            ));
        }
        if self.sdk_guard.is_none() {
            self.load_sdk().await;
        }
        match &self.error {
            Some(e @ CheckoutError::PaymentSdkUnavailable(_)) => Err(e.clone()),
            _ => Ok(()),
        }
    }

    /// Turn a completed provider capture into an order.
    ///
    /// When the backend places the order outright, the cart is cleared, the
    /// payment SDK released and the flow reaches
    /// [`CheckoutStep::Confirmation`]. When it answers with an approval link
    /// the flow stays on the payment step with the cart intact until
    /// [`complete_approval`](Self::complete_approval). On failure nothing
    /// changes except the recorded error.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::Validation`] outside the payment step, for an
    ///   incomplete capture, an empty cart, or while an order awaits approval
    /// - [`CheckoutError::PaymentSdkUnavailable`] if the chosen method needs
    ///   the SDK and it is not loaded
    /// - [`CheckoutError::OrderSubmissionFailed`] / [`CheckoutError::NetworkUnavailable`]
    ///   if order creation fails
    #[instrument(skip_all, fields(reference = %confirmation.reference, method = %self.payment_method))]
    pub async fn confirm_payment(
        &mut self,
        cart: &mut CartStore,
        confirmation: PaymentConfirmation,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if self.step != CheckoutStep::Payment {
            return self.fail(CheckoutError::Validation(
                "Payment can only be confirmed on the payment step".to_string(),
            ));
        }
        if self.awaiting_approval.is_some() {
            return self.fail(CheckoutError::Validation(
                "This order is already waiting for payment approval".to_string(),
            ));
        }
        if self.payment_method.uses_hosted_sdk() && self.sdk_guard.is_none() {
            return self.fail(CheckoutError::PaymentSdkUnavailable(
                "The payment provider has not loaded".to_string(),
            ));
        }
        if !confirmation.is_completed() {
            return self.fail(CheckoutError::Validation(format!(
                "Payment was not completed (status {})",
                confirmation.status
            )));
        }
        if cart.is_empty() {
            return self.fail(CheckoutError::Validation("Your cart is empty".to_string()));
        }

        let draft = OrderDraft::build(
            cart.items(),
            &self.shipping,
            self.payment_method,
            &self.settings.pricing,
        );
        let total = draft.totals().total;
        let payload = draft.into_payload(
            confirmation.reference,
            self.settings.return_url.clone(),
            self.settings.cancel_url.clone(),
        );

        let order = match self.api.create_order(&payload).await {
            Ok(order) => order,
            Err(e) => return self.fail(CheckoutError::from_api(e)),
        };
        self.error = None;

        if let Some(approval_url) = order.payment_url.clone() {
            info!(order_id = %order.order_id, total = %total, "Order created, awaiting payment approval");
            self.awaiting_approval = Some(order.clone());
            return Ok(CheckoutOutcome::AwaitingApproval {
                order,
                approval_url,
            });
        }

        info!(order_id = %order.order_id, total = %total, "Order created");
        self.finish(cart, order.clone());
        Ok(CheckoutOutcome::Placed(order))
    }

    /// The shopper approved the payment at the provider: finish the order
    /// returned by [`confirm_payment`](Self::confirm_payment).
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] if no order awaits approval.
    pub fn complete_approval(&mut self, cart: &mut CartStore) -> Result<CreatedOrder, CheckoutError> {
        let Some(order) = self.awaiting_approval.take() else {
            return self.fail(CheckoutError::Validation(
                "No order is waiting for payment approval".to_string(),
            ));
        };
        info!(order_id = %order.order_id, "Payment approved");
        self.finish(cart, order.clone());
        Ok(order)
    }

    fn finish(&mut self, cart: &mut CartStore, order: CreatedOrder) {
        cart.clear();
        self.sdk_guard = None;
        self.error = None;
        self.step = CheckoutStep::Confirmation;
        self.placed_order = Some(order);
    }

    async fn load_sdk(&mut self) {
        match PaymentSdkGuard::acquire(Arc::clone(&self.sdk)).await {
            Ok(guard) => {
                self.sdk_guard = Some(guard);
                self.error = None;
            }
            Err(e) => {
                self.error = Some(CheckoutError::PaymentSdkUnavailable(e.to_string()));
                warn!(error = %e, "Payment SDK failed to load");
            }
        }
    }

    fn fail<T>(&mut self, error: CheckoutError) -> Result<T, CheckoutError> {
        warn!(step = %self.step, error = %error, "Checkout action rejected");
        self.error = Some(error.clone());
        Err(error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gameshop_core::ProductId;
    use rust_decimal::Decimal;

    use super::*;
    use crate::api::FieldErrors;
    use crate::cart::{CartIdentity, CartProduct};
    use crate::payment::{OfflinePaymentSdk, PaymentError};
    use crate::storage::{KeyValueStore, MemoryStore};

    enum Reply {
        Created,
        NeedsApproval(&'static str),
        Rejected(&'static str),
        Offline,
    }

    struct FakeOrders {
        reply: Reply,
        submitted: Mutex<Vec<OrderPayload>>,
    }

    impl FakeOrders {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    impl OrderApi for FakeOrders {
        fn create_order(
            &self,
            payload: &OrderPayload,
        ) -> impl Future<Output = Result<CreatedOrder, ApiError>> + Send {
            self.submitted.lock().unwrap().push(payload.clone());
            let result = match self.reply {
                Reply::Created => Ok(CreatedOrder {
                    order_id: "A1B2C3".to_string(),
                    status: Some("Pending".to_string()),
                    payment_url: None,
                }),
                Reply::NeedsApproval(url) => Ok(CreatedOrder {
                    order_id: "A1B2C3".to_string(),
                    status: Some("Pending".to_string()),
                    payment_url: Some(url.to_string()),
                }),
                Reply::Rejected(body) => Err(ApiError::Validation(FieldErrors::from_body(body))),
                Reply::Offline => Err(ApiError::Network("connection refused".to_string())),
            };
            std::future::ready(result)
        }
    }

    #[derive(Default)]
    struct BrokenSdk {
        attempts: AtomicUsize,
    }

    impl PaymentSdk for BrokenSdk {
        async fn load(&self) -> Result<(), PaymentError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PaymentError::LoadFailed("script blocked".to_string()))
        }

        fn unload(&self) {}
    }

    fn settings(fee: bool) -> CheckoutSettings {
        let pricing = if fee {
            PricingPolicy::default()
        } else {
            PricingPolicy::default().without_service_fee()
        };
        CheckoutSettings {
            pricing,
            return_url: "http://localhost:3000/checkout/success".to_string(),
            cancel_url: "http://localhost:3000/checkout/cancel".to_string(),
            redirect_delay: Some(Duration::from_secs(5)),
        }
    }

    fn cart_with(storage: &Arc<MemoryStore>, price: &str, quantity: i64) -> CartStore {
        let mut cart = CartStore::load(storage.clone(), CartIdentity::Guest);
        cart.add_item(CartProduct {
            id: ProductId::new(1),
            name: "Hollow Knight".to_string(),
            price: Decimal::from_str(price).unwrap(),
            image: None,
        })
        .unwrap();
        if quantity > 1 {
            cart.update_quantity(ProductId::new(1), quantity).unwrap();
        }
        cart
    }

    fn shipping(name: &str) -> ShippingInfo {
        ShippingInfo {
            full_name: name.to_string(),
            email: "jo@example.com".to_string(),
            ..ShippingInfo::default()
        }
    }

    #[tokio::test]
    async fn test_shipping_guard() {
        let storage = Arc::new(MemoryStore::new());
        let cart = cart_with(&storage, "60.00", 1);
        let sdk = Arc::new(OfflinePaymentSdk::new());
        let mut checkout =
            CheckoutOrchestrator::new(FakeOrders::new(Reply::Created), sdk.clone(), settings(true));

        let err = checkout
            .advance_from_shipping(&cart, shipping(""))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
        assert_eq!(checkout.step(), CheckoutStep::Shipping);
        assert_eq!(checkout.current_error(), Some(&err));
        assert!(!sdk.is_loaded());

        checkout
            .advance_from_shipping(&cart, shipping("Jo"))
            .await
            .unwrap();
        assert_eq!(checkout.step(), CheckoutStep::Payment);
        assert_eq!(checkout.current_error(), None);
        assert!(sdk.is_loaded());
    }

    #[tokio::test]
    async fn test_empty_cart_cannot_advance() {
        let storage = Arc::new(MemoryStore::new());
        let cart = CartStore::load(storage, CartIdentity::Guest);
        let mut checkout = CheckoutOrchestrator::new(
            FakeOrders::new(Reply::Created),
            Arc::new(OfflinePaymentSdk::new()),
            settings(true),
        );
        assert!(checkout.advance_from_shipping(&cart, shipping("Jo")).await.is_err());
        assert_eq!(checkout.step(), CheckoutStep::Shipping);
    }

    #[tokio::test]
    async fn test_confirmation_submits_totals_and_clears_cart() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "60.00", 1);
        let sdk = Arc::new(OfflinePaymentSdk::new());
        let mut checkout =
            CheckoutOrchestrator::new(FakeOrders::new(Reply::Created), sdk.clone(), settings(true));

        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        assert_eq!(checkout.totals(&cart).total, Decimal::from_str("68.10").unwrap());

        let outcome = checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CAP-9"))
            .await
            .unwrap();
        assert!(matches!(&outcome, CheckoutOutcome::Placed(order) if order.order_id == "A1B2C3"));
        assert_eq!(checkout.step(), CheckoutStep::Confirmation);
        assert!(cart.is_empty());
        assert_eq!(storage.get("guestCart").unwrap(), None);
        assert!(!sdk.is_loaded());
        assert_eq!(
            checkout.redirect(),
            Some(Redirect {
                path: ORDERS_PATH,
                after: Duration::from_secs(5)
            })
        );

        let submitted = checkout.api.submitted.lock().unwrap();
        let payload = &submitted[0];
        assert_eq!(payload.subtotal, Decimal::from_str("60.00").unwrap());
        assert_eq!(payload.shipping_cost, Decimal::ZERO);
        assert_eq!(payload.tax, Decimal::from_str("5.10").unwrap());
        assert_eq!(payload.service_fee, Decimal::from_str("3.00").unwrap());
        assert_eq!(payload.total_price, Decimal::from_str("68.10").unwrap());
        assert_eq!(payload.payment_reference, "CAP-9");
    }

    #[tokio::test]
    async fn test_no_fee_totals_below_threshold() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "10.00", 2);
        let mut checkout = CheckoutOrchestrator::new(
            FakeOrders::new(Reply::Created),
            Arc::new(OfflinePaymentSdk::new()),
            settings(false),
        );
        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CAP-1"))
            .await
            .unwrap();

        let submitted = checkout.api.submitted.lock().unwrap();
        assert_eq!(submitted[0].shipping_cost, Decimal::from_str("5.99").unwrap());
        assert_eq!(submitted[0].tax, Decimal::from_str("1.70").unwrap());
        assert_eq!(submitted[0].total_price, Decimal::from_str("27.69").unwrap());
    }

    #[tokio::test]
    async fn test_failed_creation_keeps_cart_and_step() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "10.00", 2);
        let mut checkout = CheckoutOrchestrator::new(
            FakeOrders::new(Reply::Rejected(r#"{"tax": ["Price values must be positive"]}"#)),
            Arc::new(OfflinePaymentSdk::new()),
            settings(true),
        );
        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();

        let err = checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CAP-1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Price values must be positive");
        assert_eq!(checkout.step(), CheckoutStep::Payment);
        assert_eq!(checkout.current_error(), Some(&err));
        assert_eq!(cart.item_count(), 2);
        assert!(storage.get("guestCart").unwrap().is_some());
        assert_eq!(checkout.redirect(), None);
    }

    #[tokio::test]
    async fn test_network_failure_is_distinguished() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "10.00", 1);
        let mut checkout = CheckoutOrchestrator::new(
            FakeOrders::new(Reply::Offline),
            Arc::new(OfflinePaymentSdk::new()),
            settings(true),
        );
        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        let err = checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CAP-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NetworkUnavailable(_)));
        assert!(!cart.is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_capture_is_rejected() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "10.00", 1);
        let mut checkout = CheckoutOrchestrator::new(
            FakeOrders::new(Reply::Created),
            Arc::new(OfflinePaymentSdk::new()),
            settings(true),
        );
        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        let pending = PaymentConfirmation {
            reference: "CAP-1".to_string(),
            status: "PENDING".to_string(),
            payer_email: None,
        };
        assert!(checkout.confirm_payment(&mut cart, pending).await.is_err());
        assert!(checkout.api.submitted.lock().unwrap().is_empty());
        assert_eq!(checkout.step(), CheckoutStep::Payment);
    }

    #[tokio::test]
    async fn test_sdk_failure_blocks_confirmation_until_retry() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "10.00", 1);
        let sdk = Arc::new(BrokenSdk::default());
        let mut checkout =
            CheckoutOrchestrator::new(FakeOrders::new(Reply::Created), sdk.clone(), settings(true));

        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        assert_eq!(checkout.step(), CheckoutStep::Payment);
        assert!(!checkout.sdk_ready());
        assert!(matches!(
            checkout.current_error(),
            Some(CheckoutError::PaymentSdkUnavailable(_))
        ));

        let err = checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CAP-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentSdkUnavailable(_)));

        assert!(checkout.retry_payment_sdk().await.is_err());
        assert_eq!(sdk.attempts.load(Ordering::SeqCst), 2);
        assert!(!cart.is_empty());
    }

    #[tokio::test]
    async fn test_card_payment_does_not_need_hosted_sdk() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "10.00", 1);
        let mut checkout = CheckoutOrchestrator::new(
            FakeOrders::new(Reply::Created),
            Arc::new(BrokenSdk::default()),
            settings(true),
        );
        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        assert!(!checkout.sdk_ready());

        checkout.select_payment_method(PaymentMethod::CreditCard).unwrap();
        let outcome = checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CARD-1"))
            .await
            .unwrap();
        assert!(matches!(outcome, CheckoutOutcome::Placed(_)));
        assert_eq!(checkout.step(), CheckoutStep::Confirmation);
        assert_eq!(checkout.api.submitted.lock().unwrap()[0].payment_method, PaymentMethod::CreditCard);
    }

    #[tokio::test]
    async fn test_approval_link_keeps_cart_until_approved() {
        let url = "https://www.sandbox.paypal.com/checkoutnow?token=T";
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "10.00", 2);
        let sdk = Arc::new(OfflinePaymentSdk::new());
        let mut checkout = CheckoutOrchestrator::new(
            FakeOrders::new(Reply::NeedsApproval(url)),
            sdk.clone(),
            settings(true),
        );
        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();

        let outcome = checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CAP-1"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CheckoutOutcome::AwaitingApproval {
                order: checkout.awaiting_approval().unwrap().clone(),
                approval_url: url.to_string(),
            }
        );
        assert_eq!(checkout.step(), CheckoutStep::Payment);
        assert_eq!(cart.item_count(), 2);
        assert!(storage.get("guestCart").unwrap().is_some());
        assert_eq!(checkout.redirect(), None);

        // A second submission would create a duplicate order
        assert!(checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CAP-1"))
            .await
            .is_err());
        assert_eq!(checkout.api.submitted.lock().unwrap().len(), 1);

        let order = checkout.complete_approval(&mut cart).unwrap();
        assert_eq!(order.order_id, "A1B2C3");
        assert_eq!(checkout.step(), CheckoutStep::Confirmation);
        assert!(cart.is_empty());
        assert!(!sdk.is_loaded());
        assert!(checkout.awaiting_approval().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_approval_keeps_cart() {
        let storage = Arc::new(MemoryStore::new());
        let mut cart = cart_with(&storage, "10.00", 1);
        let mut checkout = CheckoutOrchestrator::new(
            FakeOrders::new(Reply::NeedsApproval("https://pay.example/approve")),
            Arc::new(OfflinePaymentSdk::new()),
            settings(true),
        );
        assert!(checkout.complete_approval(&mut cart).is_err());

        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        checkout
            .confirm_payment(&mut cart, PaymentConfirmation::completed("CAP-1"))
            .await
            .unwrap();
        checkout.back_to_shipping().unwrap();

        assert!(checkout.awaiting_approval().is_none());
        assert!(checkout.complete_approval(&mut cart).is_err());
        assert_eq!(cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_back_to_shipping_releases_sdk() {
        let storage = Arc::new(MemoryStore::new());
        let cart = cart_with(&storage, "10.00", 1);
        let sdk = Arc::new(OfflinePaymentSdk::new());
        let mut checkout =
            CheckoutOrchestrator::new(FakeOrders::new(Reply::Created), sdk.clone(), settings(true));

        assert!(checkout.select_payment_method(PaymentMethod::Stripe).is_err());
        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        checkout.select_payment_method(PaymentMethod::CreditCard).unwrap();
        assert_eq!(checkout.payment_method(), PaymentMethod::CreditCard);

        checkout.back_to_shipping().unwrap();
        assert_eq!(checkout.step(), CheckoutStep::Shipping);
        assert!(!sdk.is_loaded());
        assert_eq!(checkout.shipping_info().full_name, "Jo");
    }

    #[tokio::test]
    async fn test_dropping_checkout_releases_sdk() {
        let storage = Arc::new(MemoryStore::new());
        let cart = cart_with(&storage, "10.00", 1);
        let sdk = Arc::new(OfflinePaymentSdk::new());
        let mut checkout =
            CheckoutOrchestrator::new(FakeOrders::new(Reply::Created), sdk.clone(), settings(true));
        checkout.advance_from_shipping(&cart, shipping("Jo")).await.unwrap();
        assert!(sdk.is_loaded());
        drop(checkout);
        assert!(!sdk.is_loaded());
    }
}

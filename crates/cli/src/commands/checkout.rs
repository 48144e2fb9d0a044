//! Checkout command.
//!
//! Runs the whole flow in one go: shipping details, payment method, and the
//! provider capture the shopper completed (identified by its reference).

use clap::Args;
use gameshop_core::PaymentMethod;
use gameshop_storefront::checkout::{CheckoutOutcome, ShippingInfo};
use gameshop_storefront::error::StorefrontError;
use gameshop_storefront::payment::PaymentConfirmation;
use gameshop_storefront::state::AppState;

use super::money;

#[derive(Debug, Args)]
pub struct CheckoutArgs {
    /// Full name for shipping
    #[arg(long)]
    name: String,

    /// Contact email
    #[arg(long)]
    email: String,

    #[arg(long, default_value = "")]
    address: String,

    #[arg(long, default_value = "")]
    city: String,

    #[arg(long, default_value = "")]
    postal_code: String,

    #[arg(long, default_value = "")]
    country: String,

    /// Payment method (`paypal`, `credit_card`, `stripe`)
    #[arg(long, default_value = "paypal")]
    method: PaymentMethod,

    /// Reference of the completed payment capture
    #[arg(long)]
    reference: String,

    /// Capture status reported by the payment provider
    #[arg(long, default_value = "COMPLETED")]
    status: String,

    /// Payer email reported by the payment provider
    #[arg(long)]
    payer_email: Option<String>,
}

/// Check out the current cart.
///
/// # Errors
///
/// Returns an error if any checkout step is rejected. The cart is only
/// cleared once the order has been placed, which for provider approval
/// happens in `orders complete`.
#[allow(clippy::print_stdout)]
pub async fn run(state: &mut AppState, args: CheckoutArgs) -> Result<(), StorefrontError> {
    let mut checkout = state.checkout().await?;

    let totals = checkout.totals(state.cart());
    println!(
        "Checking out {} item(s): subtotal {}, shipping {}, tax {}, service fee {}, total {}",
        state.cart().item_count(),
        money(totals.subtotal),
        money(totals.shipping),
        money(totals.tax),
        money(totals.service_fee),
        money(totals.total)
    );

    let shipping = ShippingInfo {
        full_name: args.name,
        email: args.email,
        address: args.address,
        city: args.city,
        postal_code: args.postal_code,
        country: args.country,
    };
    checkout.advance_from_shipping(state.cart(), shipping).await?;
    checkout.select_payment_method(args.method)?;
    if args.method.uses_hosted_sdk() && !checkout.sdk_ready() {
        tracing::warn!("Payment provider not ready, retrying once");
        checkout.retry_payment_sdk().await?;
    }

    let confirmation = PaymentConfirmation {
        reference: args.reference,
        status: args.status,
        payer_email: args.payer_email,
    };
    let outcome = checkout.confirm_payment(state.cart_mut(), confirmation).await?;

    match outcome {
        CheckoutOutcome::Placed(order) => {
            println!("Order {} placed via {}.", order.order_id, checkout.payment_method());
            if let Some(redirect) = checkout.redirect() {
                println!(
                    "View it under {} (redirecting after {}s in the web storefront).",
                    redirect.path,
                    redirect.after.as_secs()
                );
            }
        }
        CheckoutOutcome::AwaitingApproval {
            order,
            approval_url,
        } => {
            println!("Order {} created; approve the payment at: {approval_url}", order.order_id);
            println!(
                "Your cart is kept until then. Once approved, run: gs-cli orders complete {}",
                order.order_id
            );
        }
    }
    Ok(())
}

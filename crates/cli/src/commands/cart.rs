//! Cart commands.

use gameshop_core::ProductId;
use gameshop_storefront::error::StorefrontError;
use gameshop_storefront::state::AppState;

use super::money;

/// Print cart lines and the totals checkout would charge.
#[allow(clippy::print_stdout)]
pub fn show(state: &AppState) {
    let cart = state.cart();
    if cart.is_empty() {
        println!("Your cart is empty.");
        return;
    }

    for item in cart.items() {
        println!(
            "{:>6}  {:<40} {:>3} x {:>10} = {:>10}",
            item.id,
            item.name,
            item.quantity,
            money(item.price),
            money(item.line_total())
        );
    }

    let totals = state.config().pricing.totals_for(cart.items());
    println!();
    println!("  Subtotal:    {:>10}", money(totals.subtotal));
    println!("  Shipping:    {:>10}", money(totals.shipping));
    println!("  Tax:         {:>10}", money(totals.tax));
    if !totals.service_fee.is_zero() {
        println!("  Service fee: {:>10}", money(totals.service_fee));
    }
    println!("  Total:       {:>10}", money(totals.total));
}

/// Add one unit of a product.
///
/// # Errors
///
/// Returns an error if the product cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn add(state: &mut AppState, id: ProductId) -> Result<(), StorefrontError> {
    state.add_product(id).await?;
    println!("Added product {id}. {} item(s) in cart.", state.cart().item_count());
    Ok(())
}

/// Remove a product.
#[allow(clippy::print_stdout)]
pub fn remove(state: &mut AppState, id: ProductId) {
    state.cart_mut().remove_item(id);
    println!("Removed product {id}.");
}

/// Set a product's quantity.
///
/// # Errors
///
/// Returns an error for quantities above the per-line cap.
#[allow(clippy::print_stdout)]
pub fn set(state: &mut AppState, id: ProductId, quantity: i64) -> Result<(), StorefrontError> {
    if state.cart_mut().update_quantity(id, quantity)? {
        println!("Product {id} quantity set to {quantity}.");
    } else {
        println!("Nothing changed (product not in cart or quantity below 1).");
    }
    Ok(())
}

/// Empty the cart.
#[allow(clippy::print_stdout)]
pub fn clear(state: &mut AppState) {
    state.cart_mut().clear();
    println!("Cart cleared.");
}

//! Login, logout, and order history.

use gameshop_core::OrderId;
use gameshop_storefront::error::StorefrontError;
use gameshop_storefront::state::AppState;
use secrecy::SecretString;

use super::money;

/// Log in and switch to the account's cart.
///
/// # Errors
///
/// Returns an error for rejected credentials or an unreachable backend.
#[allow(clippy::print_stdout)]
pub async fn login(
    state: &mut AppState,
    username: &str,
    password: String,
) -> Result<(), StorefrontError> {
    let password = SecretString::from(password);
    state.login_with_password(username, &password).await?;
    println!(
        "Logged in as {username}. {} item(s) in cart.",
        state.cart().item_count()
    );
    Ok(())
}

/// Log out, keeping the cart as the guest cart.
#[allow(clippy::print_stdout)]
pub fn logout(state: &mut AppState) {
    if !state.auth().is_authenticated() {
        println!("Not logged in.");
        return;
    }
    state.logout();
    println!(
        "Logged out. {} item(s) kept in the guest cart.",
        state.cart().item_count()
    );
}

/// List past orders.
///
/// # Errors
///
/// Returns [`StorefrontError::Permission`] when not logged in.
#[allow(clippy::print_stdout)]
pub async fn orders(state: &mut AppState) -> Result<(), StorefrontError> {
    let orders = state.orders().await?;
    if orders.is_empty() {
        println!("No orders yet.");
        return Ok(());
    }
    for order in &orders {
        let payment = format!("{:?}", order.payment_status);
        let status = format!("{:?}", order.order_status);
        let date = order
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:>6}  {:<12} {:>10}  {payment:<10} {status:<10} {date}",
            order.id,
            order.order_id.as_deref().unwrap_or("-"),
            money(order.total),
        );
    }
    Ok(())
}

/// Show one order.
///
/// # Errors
///
/// Returns [`StorefrontError::NotFound`] for unknown ids.
#[allow(clippy::print_stdout)]
pub async fn order(state: &mut AppState, id: OrderId) -> Result<(), StorefrontError> {
    let order = state.order(id).await?;
    println!("Order {}", order.order_id.as_deref().unwrap_or(&order.id.to_string()));
    println!("  Subtotal:    {:>10}", money(order.sub_total));
    println!("  Shipping:    {:>10}", money(order.shipping));
    println!("  Tax:         {:>10}", money(order.tax));
    println!("  Service fee: {:>10}", money(order.service_fee));
    println!("  Total:       {:>10}", money(order.total));
    println!("  Payment:     {:?}", order.payment_status);
    println!("  Status:      {:?}", order.order_status);
    if let Some(method) = &order.payment_method {
        println!("  Method:      {method}");
    }
    Ok(())
}

/// Finish an order whose payment was approved at the provider.
///
/// # Errors
///
/// Returns [`StorefrontError::NotFound`] if the order is not in the history;
/// the cart is kept in that case.
#[allow(clippy::print_stdout)]
pub async fn complete(state: &mut AppState, order_id: &str) -> Result<(), StorefrontError> {
    let order = state.complete_approved_order(order_id).await?;
    println!("Order {order_id} confirmed, total {}. Cart cleared.", money(order.total));
    Ok(())
}

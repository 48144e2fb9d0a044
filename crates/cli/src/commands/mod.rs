//! Subcommand implementations.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod checkout;

use gameshop_core::Price;
use rust_decimal::Decimal;

/// Format an amount for display.
fn money(amount: Decimal) -> String {
    Price::usd(amount).to_string()
}

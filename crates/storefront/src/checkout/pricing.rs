//! Order totals and the order draft.

use gameshop_core::{PaymentMethod, round_money};
use rust_decimal::Decimal;
use serde::Serialize;

use super::ShippingInfo;
use crate::api::{OrderItemPayload, OrderPayload};
use crate::cart::CartLineItem;

/// Rules for turning a subtotal into an order total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Fraction of the subtotal charged as tax.
    pub tax_rate: Decimal,
    /// Fraction of the subtotal charged as a service fee; zero disables it.
    pub service_fee_rate: Decimal,
    /// Flat shipping fee charged at or below the threshold.
    pub shipping_fee: Decimal,
    /// Subtotals strictly above this ship free.
    pub free_shipping_threshold: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(85, 3),
            service_fee_rate: Decimal::new(5, 2),
            shipping_fee: Decimal::new(599, 2),
            free_shipping_threshold: Decimal::from(50),
        }
    }
}

impl PricingPolicy {
    /// The same policy with no service fee.
    #[must_use]
    pub const fn without_service_fee(self) -> Self {
        Self {
            service_fee_rate: Decimal::ZERO,
            ..self
        }
    }

    /// Totals for a cart subtotal. Each component is rounded to cents before
    /// summing.
    #[must_use]
    pub fn totals(&self, subtotal: Decimal) -> OrderTotals {
        let subtotal = round_money(subtotal);
        let shipping = if subtotal > self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            round_money(self.shipping_fee)
        };
        let tax = round_money(subtotal * self.tax_rate);
        let service_fee = round_money(subtotal * self.service_fee_rate);

        OrderTotals {
            subtotal,
            shipping,
            tax,
            service_fee,
            total: subtotal + shipping + tax + service_fee,
        }
    }

    /// Totals for a set of cart lines.
    #[must_use]
    pub fn totals_for(&self, items: &[CartLineItem]) -> OrderTotals {
        self.totals(items.iter().map(CartLineItem::line_total).sum())
    }
}

/// Computed order amounts, all rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
}

/// Everything an order needs except the payment reference, derived from the
/// cart at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    shipping: ShippingInfo,
    items: Vec<OrderItemPayload>,
    payment_method: PaymentMethod,
    totals: OrderTotals,
}

impl OrderDraft {
    #[must_use]
    pub fn build(
        items: &[CartLineItem],
        shipping: &ShippingInfo,
        payment_method: PaymentMethod,
        policy: &PricingPolicy,
    ) -> Self {
        Self {
            shipping: shipping.clone(),
            items: items
                .iter()
                .map(|item| OrderItemPayload {
                    product_id: item.id,
                    quantity: item.quantity.get(),
                    price: item.price,
                })
                .collect(),
            payment_method,
            totals: policy.totals_for(items),
        }
    }

    #[must_use]
    pub const fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    #[must_use]
    pub fn items(&self) -> &[OrderItemPayload] {
        &self.items
    }

    #[must_use]
    pub const fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    /// The request body for the order endpoint.
    #[must_use]
    pub fn into_payload(
        self,
        payment_reference: String,
        return_url: String,
        cancel_url: String,
    ) -> OrderPayload {
        OrderPayload {
            shipping_info: self.shipping.to_payload(),
            items: self.items,
            payment_method: self.payment_method,
            payment_reference,
            subtotal: self.totals.subtotal,
            shipping_cost: self.totals.shipping,
            tax: self.totals.tax,
            service_fee: self.totals.service_fee,
            total_price: self.totals.total,
            return_url,
            cancel_url,
        }
    }
}

//! Catalog browsing commands.

use gameshop_core::{CategoryId, ProductId};
use gameshop_storefront::api::{Product, ProductQuery};
use gameshop_storefront::error::StorefrontError;
use gameshop_storefront::state::AppState;

use super::money;

/// List one page of products.
///
/// # Errors
///
/// Returns an error if the catalog cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn list(
    state: &AppState,
    page: Option<u32>,
    search: Option<String>,
    category: Option<CategoryId>,
) -> Result<(), StorefrontError> {
    let query = ProductQuery {
        page,
        search,
        category,
        exclude: None,
    };
    let listing = state.api().list_products(&query).await?;

    if listing.results.is_empty() {
        println!("No products found.");
        return Ok(());
    }
    for product in &listing.results {
        print_row(product);
    }
    println!(
        "{} of {} products{}",
        listing.results.len(),
        listing.count,
        if listing.next.is_some() { " (more with --page)" } else { "" }
    );
    Ok(())
}

/// Show one product with related products.
///
/// # Errors
///
/// Returns [`StorefrontError::NotFound`] for unknown ids.
#[allow(clippy::print_stdout)]
pub async fn show(state: &AppState, id: ProductId) -> Result<(), StorefrontError> {
    let Some(product) = state.api().product_or_placeholder(id).await else {
        return Err(StorefrontError::NotFound(format!("Product {id}")));
    };

    println!("{}", product.name);
    println!("  Price: {}", money(product.price));
    if let Some(regular) = product.regular_price.filter(|_| product.is_discounted()) {
        println!("  Was:   {}", money(regular));
    }
    println!(
        "  Stock: {}",
        if product.in_stock() { product.stock.to_string() } else { "out of stock".to_string() }
    );
    println!("  Image: {}", product.image_or_placeholder());
    if let Some(description) = product.description.as_deref().filter(|d| !d.is_empty()) {
        println!();
        println!("{description}");
    }

    match state.api().related_products(&product).await {
        Ok(related) if !related.is_empty() => {
            println!();
            println!("Related:");
            for product in &related {
                print_row(product);
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Related products unavailable"),
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_row(product: &Product) {
    let flag = if product.in_stock() { "" } else { " (out of stock)" };
    println!(
        "{:>6}  {:<40} {:>10}{flag}",
        product.id,
        product.name,
        money(product.price)
    );
}

//! Cart management commands.

use subshare_core::{BillingPeriod, PlanTier, PriceSource, ProductId};
use subshare_storefront::cart::{CartLine, PlanChange};
use subshare_storefront::{EngineError, Storefront};

/// Add a product to the cart.
///
/// # Errors
///
/// Returns an error if the quantity is out of range or no price can be
/// resolved.
pub async fn add(
    storefront: &Storefront,
    product_id: ProductId,
    plan_tier: PlanTier,
    billing_period: BillingPeriod,
    quantity: u32,
) -> Result<(), EngineError> {
    let line = storefront
        .cart()
        .add_or_update(product_id, plan_tier, billing_period, quantity)
        .await?;

    print_line(storefront, &line);
    Ok(())
}

/// Set a line's quantity.
///
/// # Errors
///
/// Returns an error if the product is not in the cart or the quantity is
/// too large.
pub fn set_quantity(
    storefront: &Storefront,
    product_id: &ProductId,
    quantity: i64,
) -> Result<(), EngineError> {
    storefront.cart().set_quantity(product_id, quantity)?;

    match storefront.cart().line(product_id) {
        Some(line) => print_line(storefront, &line),
        None => print_removed(product_id),
    }
    Ok(())
}

/// Change a line's tier and/or period, tier first.
///
/// # Errors
///
/// Returns an error if the product is not in the cart or no price can be
/// resolved.
pub async fn change_plan(
    storefront: &Storefront,
    product_id: &ProductId,
    tier: Option<PlanTier>,
    period: Option<BillingPeriod>,
) -> Result<(), EngineError> {
    let changes = tier
        .map(PlanChange::Tier)
        .into_iter()
        .chain(period.map(PlanChange::Period));

    let mut updated = None;
    for change in changes {
        updated = Some(storefront.cart().change_plan(product_id, change).await?);
    }

    match updated {
        Some(line) => print_line(storefront, &line),
        None => tracing::warn!("Nothing to change: pass --tier and/or --period"),
    }
    Ok(())
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error if the product is not in the cart.
pub fn remove(storefront: &Storefront, product_id: &ProductId) -> Result<(), EngineError> {
    storefront.cart().remove(product_id)?;
    print_removed(product_id);
    Ok(())
}

/// Empty the cart.
pub fn clear(storefront: &Storefront) {
    storefront.cart().clear();

    #[allow(clippy::print_stdout)]
    {
        println!("Cart cleared");
    }
}

/// Print every line and the total.
pub fn show(storefront: &Storefront) {
    let summary = storefront.cart().summary(storefront.currency());

    if summary.lines.is_empty() {
        #[allow(clippy::print_stdout)]
        {
            println!("Cart is empty");
        }
        return;
    }

    for line in &summary.lines {
        print_line(storefront, line);
    }

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{} item(s), total {}",
            summary.item_count,
            summary.formatted_total()
        );
    }
}

fn print_line(storefront: &Storefront, line: &CartLine) {
    let source = match line.price_source {
        Some(PriceSource::Catalog) => "",
        Some(PriceSource::Fallback) => " (estimated)",
        None => " (unpriced)",
    };

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{} {}/{} x{} @ {} = {}{source}",
            line.product_name.as_deref().unwrap_or(line.product_id.as_str()),
            line.plan_tier,
            line.billing_period,
            line.quantity,
            storefront.price(line.resolved_unit_price),
            storefront.price(line.line_total()),
        );
    }
}

fn print_removed(product_id: &ProductId) {
    #[allow(clippy::print_stdout)]
    {
        println!("Removed {product_id}");
    }
}

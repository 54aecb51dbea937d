//! Catalog listing and price quotes.

use subshare_core::{BillingPeriod, PlanTier, PriceSource, ProductId};
use subshare_storefront::{EngineError, Storefront, pricing};

/// List every product with its enabled and disabled plans.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read and nothing is cached.
pub async fn list(storefront: &Storefront, refresh: bool) -> Result<(), EngineError> {
    if refresh {
        storefront.catalog().invalidate();
    }

    let snapshot = storefront.catalog().get(None).await?;
    tracing::info!(
        products = snapshot.products.len(),
        fetched_at = %snapshot.fetched_at,
        "Catalog loaded"
    );

    let price = |raw: Option<&str>| {
        raw.and_then(pricing::parse_raw_price)
            .map_or_else(|| "-".to_string(), |amount| storefront.price(amount).display())
    };

    for product in &snapshot.products {
        let base = product
            .base_price
            .map_or_else(|| "-".to_string(), |amount| storefront.price(amount).display());
        let plans = snapshot.plans_for(&product.id);
        let plans = plans.as_deref().unwrap_or(&[]);

        #[allow(clippy::print_stdout)]
        {
            println!("{} ({}) [{}] base {base}", product.name, product.id, product.category);
            if plans.is_empty() {
                println!("  no plans, prices are estimated");
            }
            for plan in plans {
                println!(
                    "  {:<13} monthly {:>12}  yearly {:>12}{}",
                    plan.plan_tier.as_str(),
                    price(plan.monthly_price_raw.as_deref()),
                    price(plan.yearly_price_raw.as_deref()),
                    if plan.enabled { "" } else { "  (disabled)" }
                );
            }
        }
    }

    Ok(())
}

/// Resolve and print the unit price of a selection.
///
/// # Errors
///
/// Returns an error if no price can be resolved.
pub async fn quote(
    storefront: &Storefront,
    product_id: &ProductId,
    plan_tier: &PlanTier,
    billing_period: &BillingPeriod,
) -> Result<(), EngineError> {
    let quote = storefront
        .quote(product_id, plan_tier, billing_period)
        .await?;

    let source = match quote.source {
        PriceSource::Catalog => "catalog",
        PriceSource::Fallback => "estimate",
    };

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{product_id} {plan_tier}/{billing_period}: {} ({source})",
            storefront.price(quote.amount)
        );
    }

    Ok(())
}

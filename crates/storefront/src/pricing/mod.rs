//! Unit price resolution for a (product, tier, period) selection.
//!
//! Resolution tries, in order:
//! 1. An enabled catalog plan for the requested tier, reading the monthly
//!    price for `1_month` and the yearly price for `1_year`
//! 2. A multiplier-based estimate scaled from the line's previous price
//!    (or the product's legacy base price for a new line)
//!
//! The catalog only stores monthly and yearly prices, so every other period
//! always goes through the estimate.
//!
//! Everything here is pure: the same inputs always give the same price.

pub mod table;

use rust_decimal::{Decimal, RoundingStrategy};
use subshare_core::{BillingPeriod, PlanTier, PriceSource, ProductId};
use thiserror::Error;

use crate::catalog::PricingPlan;

/// Errors that can occur when resolving a price.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// Neither the catalog nor the fallback produced a positive price.
    #[error("no price available for {product_id} ({tier}, {period})")]
    Unavailable {
        product_id: ProductId,
        tier: PlanTier,
        period: BillingPeriod,
    },
}

/// A price together with the selection it was valid for.
///
/// Seeds the fallback estimate when the selection changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousPrice {
    pub amount: Decimal,
    pub tier: PlanTier,
    pub period: BillingPeriod,
}

impl PreviousPrice {
    /// A legacy single product price, which is quoted for one shared month.
    #[must_use]
    pub const fn from_base_price(amount: Decimal) -> Self {
        Self {
            amount,
            tier: PlanTier::Shared,
            period: BillingPeriod::OneMonth,
        }
    }
}

/// A resolved unit price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub amount: Decimal,
    pub source: PriceSource,
    /// Raw catalog text the price was parsed from, for catalog quotes.
    pub raw_price: Option<String>,
}

/// Resolve the unit price for `product_id` at `tier`/`period`.
///
/// `plans` is whatever the catalog has for the product (`None` when
/// unavailable). `previous` seeds the fallback estimate.
///
/// # Errors
///
/// Returns `PricingError::Unavailable` if no catalog plan matches and the
/// fallback cannot produce a positive price (missing or zero previous price).
pub fn resolve(
    product_id: &ProductId,
    tier: &PlanTier,
    period: &BillingPeriod,
    plans: Option<&[PricingPlan]>,
    previous: Option<&PreviousPrice>,
) -> Result<Quote, PricingError> {
    if let Some((amount, raw)) = plans.and_then(|plans| catalog_price(plans, tier, period)) {
        return Ok(Quote {
            amount,
            source: PriceSource::Catalog,
            raw_price: Some(raw.to_string()),
        });
    }

    previous
        .and_then(|previous| fallback_price(previous, tier, period))
        .map(|amount| {
            tracing::debug!(
                product_id = %product_id,
                tier = %tier,
                period = %period,
                %amount,
                "Catalog had no usable price, using multiplier estimate"
            );
            Quote {
                amount,
                source: PriceSource::Fallback,
                raw_price: None,
            }
        })
        .ok_or_else(|| PricingError::Unavailable {
            product_id: product_id.clone(),
            tier: tier.clone(),
            period: period.clone(),
        })
}

/// Price from the first enabled plan for `tier` whose field for `period`
/// parses to a positive amount.
#[must_use]
pub fn catalog_price<'a>(
    plans: &'a [PricingPlan],
    tier: &PlanTier,
    period: &BillingPeriod,
) -> Option<(Decimal, &'a str)> {
    plans
        .iter()
        .filter(|plan| plan.enabled && &plan.plan_tier == tier)
        .find_map(|plan| {
            let raw = match period {
                BillingPeriod::OneMonth => plan.monthly_price_raw.as_deref(),
                BillingPeriod::OneYear => plan.yearly_price_raw.as_deref(),
                _ => None,
            }?;
            parse_raw_price(raw).map(|amount| (amount, raw))
        })
}

/// Parse free-text catalog prices such as `"₹1,400"` or `"1,234.50/mo"`.
///
/// Keeps only digits, `.` and `,`, drops `,` as a thousands separator, and
/// parses what is left. Anything that does not parse to a positive amount is
/// `None`.
#[must_use]
pub fn parse_raw_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    cleaned
        .parse::<Decimal>()
        .ok()
        .filter(|amount| amount.is_sign_positive() && !amount.is_zero())
}

/// Scale `previous` to `tier`/`period` with the multiplier table, rounded
/// to a whole amount (half away from zero).
#[must_use]
pub fn fallback_price(
    previous: &PreviousPrice,
    tier: &PlanTier,
    period: &BillingPeriod,
) -> Option<Decimal> {
    if !previous.amount.is_sign_positive() || previous.amount.is_zero() {
        return None;
    }

    let base = previous
        .amount
        .checked_div(table::multiplier(&previous.tier, &previous.period))?;
    let estimate = base
        .checked_mul(table::multiplier(tier, period))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    (estimate.is_sign_positive() && !estimate.is_zero()).then_some(estimate)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn plan(tier: PlanTier, monthly: Option<&str>, yearly: Option<&str>, enabled: bool) -> PricingPlan {
        PricingPlan {
            product_id: ProductId::new("p1"),
            plan_tier: tier,
            monthly_price_raw: monthly.map(String::from),
            yearly_price_raw: yearly.map(String::from),
            enabled,
        }
    }

    fn previous(amount: i64, tier: PlanTier, period: BillingPeriod) -> PreviousPrice {
        PreviousPrice {
            amount: Decimal::new(amount, 0),
            tier,
            period,
        }
    }

    #[test]
    fn test_parse_raw_price() {
        assert_eq!(parse_raw_price("₹1,400"), Some(Decimal::new(1400, 0)));
        assert_eq!(parse_raw_price("1400"), Some(Decimal::new(1400, 0)));
        assert_eq!(parse_raw_price("₹1,234.50 / month"), Some(Decimal::new(123_450, 2)));
        assert_eq!(parse_raw_price("₹11,200"), Some(Decimal::new(11200, 0)));
    }

    #[test]
    fn test_parse_raw_price_rejects_unusable_text() {
        assert_eq!(parse_raw_price("Contact us"), None);
        assert_eq!(parse_raw_price(""), None);
        assert_eq!(parse_raw_price("₹0"), None);
        assert_eq!(parse_raw_price("1.2.3"), None);
        // The minus sign is stripped along with other symbols
        assert_eq!(parse_raw_price("-500"), Some(Decimal::new(500, 0)));
    }

    #[test]
    fn test_monthly_plan_matches() {
        let plans = [plan(PlanTier::Shared, Some("₹1,400"), None, true)];
        let quote = resolve(
            &ProductId::new("p1"),
            &PlanTier::Shared,
            &BillingPeriod::OneMonth,
            Some(plans.as_slice()),
            None,
        )
        .unwrap();

        assert_eq!(quote.amount, Decimal::new(1400, 0));
        assert_eq!(quote.source, PriceSource::Catalog);
        assert_eq!(quote.raw_price.as_deref(), Some("₹1,400"));
    }

    #[test]
    fn test_yearly_plan_matches() {
        let plans = [plan(PlanTier::Shared, Some("₹1,400"), Some("₹11,200"), true)];
        let quote = resolve(
            &ProductId::new("p1"),
            &PlanTier::Shared,
            &BillingPeriod::OneYear,
            Some(plans.as_slice()),
            None,
        )
        .unwrap();

        assert_eq!(quote.amount, Decimal::new(11200, 0));
        assert_eq!(quote.source, PriceSource::Catalog);
    }

    #[test]
    fn test_disabled_and_other_tier_plans_are_ignored() {
        let plans = [
            plan(PlanTier::Shared, Some("999"), None, false),
            plan(PlanTier::Private, Some("2000"), None, true),
        ];
        let result = resolve(
            &ProductId::new("p1"),
            &PlanTier::Shared,
            &BillingPeriod::OneMonth,
            Some(plans.as_slice()),
            None,
        );
        assert!(matches!(result, Err(PricingError::Unavailable { .. })));
    }

    #[test]
    fn test_intermediate_periods_use_fallback() {
        let plans = [plan(PlanTier::Shared, Some("1000"), Some("8000"), true)];
        let prev = previous(1000, PlanTier::Shared, BillingPeriod::OneMonth);
        let quote = resolve(
            &ProductId::new("p1"),
            &PlanTier::Shared,
            &BillingPeriod::ThreeMonths,
            Some(plans.as_slice()),
            Some(&prev),
        )
        .unwrap();

        assert_eq!(quote.amount, Decimal::new(2500, 0));
        assert_eq!(quote.source, PriceSource::Fallback);
    }

    #[test]
    fn test_fallback_without_catalog() {
        let prev = previous(1000, PlanTier::Shared, BillingPeriod::OneMonth);
        let quote = resolve(
            &ProductId::new("p2"),
            &PlanTier::Private,
            &BillingPeriod::OneMonth,
            None,
            Some(&prev),
        )
        .unwrap();

        assert_eq!(quote.amount, Decimal::new(2000, 0));
        assert_eq!(quote.source, PriceSource::Fallback);
        assert!(quote.raw_price.is_none());
    }

    #[test]
    fn test_fallback_rebases_from_previous_selection() {
        // 3375 at semi_private/6_months -> base 500 -> private/1_year = 8000
        let prev = previous(3375, PlanTier::SemiPrivate, BillingPeriod::SixMonths);
        assert_eq!(
            fallback_price(&prev, &PlanTier::Private, &BillingPeriod::OneYear),
            Some(Decimal::new(8000, 0))
        );
    }

    #[test]
    fn test_fallback_rounds_half_away_from_zero() {
        // 333 / 1.5 = 222 -> * 2.5 = 555
        let prev = previous(333, PlanTier::SemiPrivate, BillingPeriod::OneMonth);
        assert_eq!(
            fallback_price(&prev, &PlanTier::Shared, &BillingPeriod::ThreeMonths),
            Some(Decimal::new(555, 0))
        );
        // 101 * 2.5 = 252.5 -> 253
        let prev = previous(101, PlanTier::Shared, BillingPeriod::OneMonth);
        assert_eq!(
            fallback_price(&prev, &PlanTier::Shared, &BillingPeriod::ThreeMonths),
            Some(Decimal::new(253, 0))
        );
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let prev = previous(749, PlanTier::SemiPrivate, BillingPeriod::TwoYears);
        let first = fallback_price(&prev, &PlanTier::Private, &BillingPeriod::Lifetime);
        for _ in 0..10 {
            assert_eq!(
                fallback_price(&prev, &PlanTier::Private, &BillingPeriod::Lifetime),
                first
            );
        }
    }

    #[test]
    fn test_fallback_rejects_zero_previous() {
        let prev = previous(0, PlanTier::Shared, BillingPeriod::OneMonth);
        assert_eq!(
            fallback_price(&prev, &PlanTier::Private, &BillingPeriod::OneMonth),
            None
        );
    }

    #[test]
    fn test_unparsable_plan_without_previous_is_unavailable() {
        let plans = [plan(PlanTier::Shared, Some("Contact us"), None, true)];
        let err = resolve(
            &ProductId::new("p1"),
            &PlanTier::Shared,
            &BillingPeriod::OneMonth,
            Some(plans.as_slice()),
            None,
        )
        .unwrap_err();

        assert_eq!(
            err,
            PricingError::Unavailable {
                product_id: ProductId::new("p1"),
                tier: PlanTier::Shared,
                period: BillingPeriod::OneMonth,
            }
        );
    }

    #[test]
    fn test_unknown_tier_falls_back_with_unit_multiplier() {
        let prev = previous(500, PlanTier::Shared, BillingPeriod::OneMonth);
        let quote = resolve(
            &ProductId::new("p1"),
            &PlanTier::Unknown("family".to_string()),
            &BillingPeriod::OneMonth,
            Some(&[] as &[PricingPlan]),
            Some(&prev),
        )
        .unwrap();
        assert_eq!(quote.amount, Decimal::new(500, 0));
    }
}

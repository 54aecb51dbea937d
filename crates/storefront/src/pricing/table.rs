//! Static multipliers for the fallback price estimate.

use rust_decimal::Decimal;
use subshare_core::{BillingPeriod, PlanTier};

/// Price multiplier for a plan tier, relative to `shared`.
#[must_use]
pub fn tier_multiplier(tier: &PlanTier) -> Decimal {
    match tier {
        PlanTier::Shared | PlanTier::Unknown(_) => Decimal::ONE,
        PlanTier::SemiPrivate => Decimal::new(15, 1),
        PlanTier::Private => Decimal::TWO,
    }
}

/// Price multiplier for a billing period, relative to one month.
#[must_use]
pub fn period_multiplier(period: &BillingPeriod) -> Decimal {
    match period {
        BillingPeriod::OneMonth | BillingPeriod::Unknown(_) => Decimal::ONE,
        BillingPeriod::ThreeMonths => Decimal::new(25, 1),
        BillingPeriod::SixMonths => Decimal::new(45, 1),
        BillingPeriod::OneYear => Decimal::new(8, 0),
        BillingPeriod::TwoYears => Decimal::new(14, 0),
        BillingPeriod::Lifetime => Decimal::new(25, 0),
    }
}

/// Combined tier × period multiplier.
#[must_use]
pub fn multiplier(tier: &PlanTier, period: &BillingPeriod) -> Decimal {
    tier_multiplier(tier) * period_multiplier(period)
}

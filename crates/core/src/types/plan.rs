//! Plan tier and billing period selections.
//!
//! Both sets are open-ended on the catalog side: tiers or periods introduced
//! externally arrive as [`PlanTier::Unknown`] / [`BillingPeriod::Unknown`]
//! carrying the raw string, instead of failing deserialization.

use core::fmt;

use serde::{Deserialize, Serialize};

/// The sharing level of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum PlanTier {
    #[default]
    Shared,
    SemiPrivate,
    Private,
    /// A tier this client does not know about.
    Unknown(String),
}

impl PlanTier {
    /// Wire name of the tier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Shared => "shared",
            Self::SemiPrivate => "semi_private",
            Self::Private => "private",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for PlanTier {
    fn from(s: &str) -> Self {
        match s {
            "shared" => Self::Shared,
            "semi_private" => Self::SemiPrivate,
            "private" => Self::Private,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl From<String> for PlanTier {
    fn from(s: String) -> Self {
        match Self::from(s.as_str()) {
            Self::Unknown(_) => Self::Unknown(s),
            known => known,
        }
    }
}

impl From<PlanTier> for String {
    fn from(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Unknown(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanTier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// The subscription duration purchased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum BillingPeriod {
    #[default]
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    Lifetime,
    /// A period this client does not know about.
    Unknown(String),
}

impl BillingPeriod {
    /// Wire name of the period.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::OneMonth => "1_month",
            Self::ThreeMonths => "3_months",
            Self::SixMonths => "6_months",
            Self::OneYear => "1_year",
            Self::TwoYears => "2_years",
            Self::Lifetime => "lifetime",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for BillingPeriod {
    fn from(s: &str) -> Self {
        match s {
            "1_month" => Self::OneMonth,
            "3_months" => Self::ThreeMonths,
            "6_months" => Self::SixMonths,
            "1_year" => Self::OneYear,
            "2_years" => Self::TwoYears,
            "lifetime" => Self::Lifetime,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl From<String> for BillingPeriod {
    fn from(s: String) -> Self {
        match Self::from(s.as_str()) {
            Self::Unknown(_) => Self::Unknown(s),
            known => known,
        }
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        match period {
            BillingPeriod::Unknown(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BillingPeriod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tiers_parse() {
        assert_eq!(PlanTier::from("shared"), PlanTier::Shared);
        assert_eq!(PlanTier::from("semi_private"), PlanTier::SemiPrivate);
        assert_eq!(PlanTier::from("private"), PlanTier::Private);
    }

    #[test]
    fn test_unknown_tier_is_preserved() {
        let tier: PlanTier = serde_json::from_str("\"family\"").unwrap();
        assert_eq!(tier, PlanTier::Unknown("family".to_string()));
        assert_eq!(serde_json::to_string(&tier).unwrap(), "\"family\"");
    }

    #[test]
    fn test_periods_use_wire_names() {
        let json = serde_json::to_string(&BillingPeriod::ThreeMonths).unwrap();
        assert_eq!(json, "\"3_months\"");

        let period: BillingPeriod = serde_json::from_str("\"lifetime\"").unwrap();
        assert_eq!(period, BillingPeriod::Lifetime);
    }

    #[test]
    fn test_unknown_period_is_preserved() {
        let period: BillingPeriod = "18_months".parse().unwrap();
        assert_eq!(period, BillingPeriod::Unknown("18_months".to_string()));
        assert_eq!(period.to_string(), "18_months");
    }
}

//! Status enums for purchase hand-off.

use serde::{Deserialize, Serialize};

/// Approval status of a generated product code.
///
/// Codes leave checkout as `Pending`; approval happens in an external admin
/// workflow that this system does not model beyond the initial hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductCodeStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ProductCodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ProductCodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("invalid product code status: {s}")),
        }
    }
}

/// Where a cart line's unit price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// An enabled catalog plan matched the requested tier and period.
    Catalog,
    /// Estimated from the previous price with the multiplier table.
    Fallback,
}

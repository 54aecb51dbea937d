//! Core types for SubShare.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod plan;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use plan::{BillingPeriod, PlanTier};
pub use price::{CurrencyCode, Price};
pub use status::*;

//! SubShare storefront engine.
//!
//! Cart, dynamic pricing, catalog cache and checkout for shared software
//! subscriptions, as a library consumed by UI code and the `subshare` CLI.
//!
//! # Modules
//!
//! - `catalog` - Catalog provider trait, HTTP client and TTL cache
//! - `pricing` - Unit price resolution with multiplier fallback
//! - `cart` - Persistent cart store
//! - `checkout` - Purchase request assembly and idempotent submission
//! - `notify` - Order summary delivery
//! - `state` - Service container wiring the above together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod notify;
pub mod pricing;
pub mod state;

pub use error::EngineError;
pub use state::{Components, Storefront};

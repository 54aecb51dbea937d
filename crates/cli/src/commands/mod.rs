//! Subcommand implementations.
//!
//! Commands print results to stdout; diagnostics go through `tracing` to
//! stderr.

pub mod cart;
pub mod catalog;
pub mod checkout;

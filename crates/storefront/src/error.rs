//! Unified error handling with Sentry integration.
//!
//! Each module has its own error enum; [`EngineError`] wraps them for callers
//! that drive several modules (the service container and the CLI).

use thiserror::Error;

use crate::cart::CartError;
use crate::catalog::CatalogError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::notify::NotifyError;
use crate::pricing::PricingError;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

impl EngineError {
    /// Whether the error came from bad user input rather than a failing
    /// dependency.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Pricing(_)
                | Self::Cart(_)
                | Self::Checkout(CheckoutError::Validation(_))
        )
    }

    /// Log the error, capturing dependency failures to Sentry.
    pub fn report(&self) {
        if self.is_user_error() {
            tracing::debug!(error = %self, "Rejected user action");
            return;
        }

        let event_id = sentry::capture_error(self);
        tracing::error!(
            error = %self,
            sentry_event_id = %event_id,
            "Engine error"
        );
    }
}

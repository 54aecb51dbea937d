//! Engine services shared across the application.
//!
//! One [`Storefront`] is built at startup (`init`) and handed to consumers.
//! `reset` returns it to a clean state on logout or between tests.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use subshare_core::{BillingPeriod, CurrencyCode, PlanTier, Price, ProductId};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::cart::{CartStorage, CartStore, FileCartStorage};
use crate::catalog::{CatalogCache, CatalogProvider, HttpCatalogProvider};
use crate::checkout::{
    Buyer, CheckoutError, CheckoutOrchestrator, HttpPurchaseBackend, PurchaseBackend,
    PurchaseResult,
};
use crate::config::{DEFAULT_CACHE_TTL, EngineConfig};
use crate::error::EngineError;
use crate::notify::{
    LogNotifier, Notifier, WebhookNotifier, WhatsAppNotifier, spawn_notification_listener,
};
use crate::pricing::{self, PreviousPrice, PricingError, Quote};

/// Collaborators a [`Storefront`] is assembled from.
pub struct Components {
    pub catalog: Arc<dyn CatalogProvider>,
    pub purchase: Arc<dyn PurchaseBackend>,
    pub storage: Arc<dyn CartStorage>,
    pub notifiers: Vec<Arc<dyn Notifier>>,
    pub cache_ttl: Duration,
    pub currency: CurrencyCode,
}

impl Components {
    /// Components with the default TTL, INR and no notifiers.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        purchase: Arc<dyn PurchaseBackend>,
        storage: Arc<dyn CartStorage>,
    ) -> Self {
        Self {
            catalog,
            purchase,
            storage,
            notifiers: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            currency: CurrencyCode::default(),
        }
    }
}

/// The engine's service container.
///
/// Cheaply cloneable via `Arc`; clones share every service.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    currency: CurrencyCode,
    catalog: CatalogCache,
    cart: CartStore,
    checkout: CheckoutOrchestrator,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl std::fmt::Debug for Storefront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storefront")
            .field("currency", &self.inner.currency)
            .field("cart", &self.inner.cart)
            .field("checkout", &self.inner.checkout)
            .field("notifiers", &self.inner.notifiers.len())
            .finish_non_exhaustive()
    }
}

impl Storefront {
    /// Build the HTTP-backed services described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn init(config: &EngineConfig) -> Result<Self, EngineError> {
        let catalog = HttpCatalogProvider::new(&config.catalog)?;
        let purchase = HttpPurchaseBackend::new(&config.purchase)?;

        let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
        if let Some(number) = &config.notifications.whatsapp_number {
            notifiers.push(Arc::new(WhatsAppNotifier::new(number.clone())));
        }
        if let Some(url) = &config.notifications.webhook_url {
            notifiers.push(Arc::new(WebhookNotifier::new(
                url.clone(),
                config.purchase.timeout,
            )?));
        }

        info!(
            catalog = %config.catalog.base_url,
            purchase = %config.purchase.base_url,
            cart_dir = %config.cart_dir.display(),
            notifiers = notifiers.len(),
            "Storefront initialized"
        );

        Ok(Self::with_components(Components {
            catalog: Arc::new(catalog),
            purchase: Arc::new(purchase),
            storage: Arc::new(FileCartStorage::new(&config.cart_dir)),
            notifiers,
            cache_ttl: config.cache_ttl,
            currency: config.currency,
        }))
    }

    /// Assemble from explicit collaborators.
    #[must_use]
    pub fn with_components(components: Components) -> Self {
        let catalog = CatalogCache::new(components.catalog, components.cache_ttl);
        let cart = CartStore::new(catalog.clone(), components.storage);
        let checkout = CheckoutOrchestrator::new(components.purchase, components.currency);

        Self {
            inner: Arc::new(StorefrontInner {
                currency: components.currency,
                catalog,
                cart,
                checkout,
                notifiers: components.notifiers,
            }),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn checkout_orchestrator(&self) -> &CheckoutOrchestrator {
        &self.inner.checkout
    }

    #[must_use]
    pub fn currency(&self) -> CurrencyCode {
        self.inner.currency
    }

    /// Amount in the configured currency.
    #[must_use]
    pub fn price(&self, amount: Decimal) -> Price {
        Price::new(amount, self.inner.currency)
    }

    /// Start delivering checkout events to the configured notifiers.
    ///
    /// The listener ends once every clone of this `Storefront` is dropped
    /// and pending events are delivered.
    #[must_use]
    pub fn spawn_notifications(&self) -> JoinHandle<()> {
        spawn_notification_listener(
            self.inner.checkout.subscribe(),
            self.inner.notifiers.clone(),
        )
    }

    /// Estimate the price of a selection without touching the cart.
    ///
    /// Unlike adding a line, a selection with no catalog match is estimated
    /// from the product's base price. The quote's `source` tells the two
    /// apart.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Unavailable` if the catalog has no match and
    /// the product has no base price.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn quote(
        &self,
        product_id: &ProductId,
        plan_tier: &PlanTier,
        billing_period: &BillingPeriod,
    ) -> Result<Quote, PricingError> {
        let lookup = self.inner.catalog.lookup(product_id).await;
        let previous = lookup
            .product
            .as_ref()
            .and_then(|p| p.base_price)
            .map(PreviousPrice::from_base_price);

        pricing::resolve(
            product_id,
            plan_tier,
            billing_period,
            lookup.plans.as_deref(),
            previous.as_ref(),
        )
    }

    /// Check out the current cart.
    ///
    /// On success the purchased lines are removed from the cart.
    ///
    /// # Errors
    ///
    /// Propagates [`CheckoutOrchestrator::submit`] errors; the cart is left
    /// untouched.
    pub async fn checkout(&self, buyer: &Buyer) -> Result<PurchaseResult, CheckoutError> {
        let lines = self.inner.cart.lines();
        let result = self.inner.checkout.submit(buyer, &lines).await?;
        self.inner.cart.remove_purchased(&lines);
        Ok(result)
    }

    /// Drop cached catalog data and empty the cart.
    pub fn reset(&self) {
        self.inner.catalog.reset();
        self.inner.cart.clear();
        info!("Storefront reset");
    }
}

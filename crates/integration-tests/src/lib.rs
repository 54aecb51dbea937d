//! Integration tests for the SubShare storefront engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p subshare-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `scenarios` - End-to-end cart and checkout walkthroughs
//! - `properties` - Uniqueness, consistency, coalescing and idempotency
//! - `http` - The full engine against mock catalog and purchase servers
//!
//! This crate provides in-memory fakes of the engine's collaborators and a
//! [`TestContext`] that wires them into a [`Storefront`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use subshare_core::{BillingPeriod, PlanTier, PriceSource, ProductCode, ProductId, UserCode};
use subshare_storefront::cart::{CART_STORAGE_KEY, CartLine, CartStorage, MemoryCartStorage};
use subshare_storefront::catalog::{CatalogError, CatalogProvider, PricingPlan, Product};
use subshare_storefront::checkout::{
    CheckoutError, ProductCodeResponse, PurchaseBackend, PurchaseRequest, PurchaseResponse,
};
use subshare_storefront::{Components, Storefront};

// =============================================================================
// Fixtures
// =============================================================================

/// A product with an optional legacy base price.
#[must_use]
pub fn product(id: &str, base_price: Option<i64>) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("{id} premium"),
        category: "streaming".to_string(),
        base_price: base_price.map(|p| Decimal::new(p, 0)),
        main_image_url: None,
    }
}

/// An enabled plan.
#[must_use]
pub fn plan(id: &str, tier: PlanTier, monthly: Option<&str>, yearly: Option<&str>) -> PricingPlan {
    PricingPlan {
        product_id: ProductId::new(id),
        plan_tier: tier,
        monthly_price_raw: monthly.map(String::from),
        yearly_price_raw: yearly.map(String::from),
        enabled: true,
    }
}

/// Whole-unit decimal.
#[must_use]
pub fn amount(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

/// A line as it would have been saved by an earlier session.
#[must_use]
pub fn saved_line(
    id: &str,
    tier: PlanTier,
    period: BillingPeriod,
    quantity: u32,
    unit_price: i64,
) -> CartLine {
    CartLine {
        product_id: ProductId::new(id),
        product_name: None,
        quantity,
        plan_tier: tier,
        billing_period: period,
        resolved_unit_price: amount(unit_price),
        price_source: Some(PriceSource::Fallback),
        catalog_snapshot_ref: None,
    }
}

/// Storage already holding `lines`.
#[must_use]
pub fn saved_cart(lines: &[CartLine]) -> Arc<MemoryCartStorage> {
    let blob = serde_json::json!({ "version": 1, "lines": lines });
    Arc::new(MemoryCartStorage::with_blob(CART_STORAGE_KEY, blob.to_string()))
}

// =============================================================================
// Fake Catalog
// =============================================================================

/// In-memory catalog provider that counts calls.
pub struct FakeCatalog {
    products: Mutex<Vec<Product>>,
    plans: Mutex<Vec<PricingPlan>>,
    delay: Duration,
    failing: AtomicBool,
    product_calls: AtomicUsize,
    plan_calls: AtomicUsize,
}

impl FakeCatalog {
    #[must_use]
    pub fn new(products: Vec<Product>, plans: Vec<PricingPlan>) -> Self {
        Self {
            products: Mutex::new(products),
            plans: Mutex::new(plans),
            delay: Duration::ZERO,
            failing: AtomicBool::new(false),
            product_calls: AtomicUsize::new(0),
            plan_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every response by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replace the plan list served from the next fetch on.
    pub fn set_plans(&self, plans: Vec<PricingPlan>) {
        *self.plans.lock().unwrap_or_else(PoisonError::into_inner) = plans;
    }

    #[must_use]
    pub fn product_calls(&self) -> usize {
        self.product_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<(), CatalogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Api {
                status: 503,
                message: "catalog unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogProvider for FakeCatalog {
    async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError> {
        self.product_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.check_failing()?;
        Ok(self
            .products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn fetch_pricing_plans(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<PricingPlan>, CatalogError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.check_failing()?;
        Ok(self
            .plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| product_ids.contains(&p.product_id))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Fake Purchase Backend
// =============================================================================

/// Purchase backend that issues one code per item and records requests.
pub struct FakeBackend {
    delay: Duration,
    returning: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<PurchaseRequest>>,
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            returning: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report every buyer as a returning customer.
    #[must_use]
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<PurchaseRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PurchaseBackend for FakeBackend {
    async fn submit(&self, request: &PurchaseRequest) -> Result<PurchaseResponse, CheckoutError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        tokio::time::sleep(self.delay).await;

        Ok(PurchaseResponse {
            success: true,
            user_code: Some(UserCode::new(format!("USR-{call}"))),
            is_returning_user: self.returning,
            product_codes: request
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| ProductCodeResponse {
                    code: ProductCode::new(format!("{}-{call}-{i}", item.product_id)),
                    product_id: item.product_id.clone(),
                    product_name: None,
                })
                .collect(),
            total_amount: Some(request.total()),
            currency: Some(request.currency.to_string()),
            error: None,
        })
    }
}

// =============================================================================
// Test Context
// =============================================================================

/// A storefront wired to fakes, with handles to inspect them.
pub struct TestContext {
    pub storefront: Storefront,
    pub catalog: Arc<FakeCatalog>,
    pub backend: Arc<FakeBackend>,
    pub storage: Arc<MemoryCartStorage>,
}

impl TestContext {
    #[must_use]
    pub fn new(catalog: FakeCatalog, backend: FakeBackend) -> Self {
        Self::with_storage(catalog, backend, Arc::new(MemoryCartStorage::new()))
    }

    #[must_use]
    pub fn with_storage(
        catalog: FakeCatalog,
        backend: FakeBackend,
        storage: Arc<MemoryCartStorage>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let backend = Arc::new(backend);
        let storefront = Storefront::with_components(Components::new(
            Arc::clone(&catalog) as Arc<dyn CatalogProvider>,
            Arc::clone(&backend) as Arc<dyn PurchaseBackend>,
            Arc::clone(&storage) as Arc<dyn CartStorage>,
        ));

        Self {
            storefront,
            catalog,
            backend,
            storage,
        }
    }

    /// A second storefront over the same storage, as after a restart.
    #[must_use]
    pub fn reopen(&self) -> Storefront {
        Storefront::with_components(Components::new(
            Arc::clone(&self.catalog) as Arc<dyn CatalogProvider>,
            Arc::clone(&self.backend) as Arc<dyn PurchaseBackend>,
            Arc::clone(&self.storage) as Arc<dyn CartStorage>,
        ))
    }
}

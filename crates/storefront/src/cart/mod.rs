//! Persistent shopping cart of subscription selections.
//!
//! Lines are keyed by product id (one line per product) and always carry a
//! unit price resolved for their current tier and period. Every mutation is
//! written through to [`CartStorage`]; the stored blob is read back once when
//! the store is created.
//!
//! Mutations that need a price await the catalog first, then take the cart
//! lock and apply atomically. State is re-read under the lock, so a line
//! that changed or disappeared during the await is handled against its
//! current value.

pub mod storage;

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use subshare_core::{BillingPeriod, CurrencyCode, PlanTier, Price, PriceSource, ProductId};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::catalog::{CatalogCache, CatalogLookup};
use crate::pricing::{self, PreviousPrice, PricingError, Quote};

pub use storage::{
    CART_STORAGE_KEY, CartStorage, FileCartStorage, MemoryCartStorage, StorageError,
};

/// Largest quantity a single line may hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Version tag of the persisted cart blob.
const PERSISTED_VERSION: u32 = 1;

/// Errors that can occur when mutating the cart.
#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("product {0} is not in the cart")]
    LineNotFound(ProductId),

    #[error("quantity {quantity} is out of range (1-99)")]
    QuantityOutOfRange { quantity: i64 },
}

// =============================================================================
// Cart Lines
// =============================================================================

/// The catalog data a line's price was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshotRef {
    /// When the plans were fetched.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Tier of the plan that matched.
    pub plan_tier: PlanTier,
    /// Raw catalog price text that was parsed.
    pub raw_price: String,
}

/// One product selection in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    #[serde(default)]
    pub product_name: Option<String>,
    pub quantity: u32,
    pub plan_tier: PlanTier,
    pub billing_period: BillingPeriod,
    pub resolved_unit_price: Decimal,
    #[serde(default)]
    pub price_source: Option<PriceSource>,
    #[serde(default)]
    pub catalog_snapshot_ref: Option<CatalogSnapshotRef>,
}

impl CartLine {
    /// Unit price × quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.resolved_unit_price * Decimal::from(self.quantity)
    }

    /// The line's current price as the seed for re-resolution.
    fn previous_price(&self) -> PreviousPrice {
        PreviousPrice {
            amount: self.resolved_unit_price,
            tier: self.plan_tier.clone(),
            period: self.billing_period.clone(),
        }
    }

    fn apply_quote(&mut self, quote: Quote, lookup: &CatalogLookup) {
        self.catalog_snapshot_ref = quote.raw_price.map(|raw_price| CatalogSnapshotRef {
            fetched_at: lookup.fetched_at,
            plan_tier: self.plan_tier.clone(),
            raw_price,
        });
        self.resolved_unit_price = quote.amount;
        self.price_source = Some(quote.source);
    }

    fn is_valid(&self) -> bool {
        (1..=MAX_LINE_QUANTITY).contains(&self.quantity)
            && self.resolved_unit_price.is_sign_positive()
            && !self.resolved_unit_price.is_zero()
    }
}

/// A field of a line's plan selection to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanChange {
    Tier(PlanTier),
    Period(BillingPeriod),
}

/// Read-only view of the cart for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub total: Price,
}

impl CartSummary {
    /// Formatted total, e.g. `₹2,800.00`.
    #[must_use]
    pub fn formatted_total(&self) -> String {
        self.total.display()
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedCart {
    version: u32,
    lines: Vec<CartLine>,
}

// =============================================================================
// Cart Store
// =============================================================================

/// The process-wide cart.
///
/// Cheaply cloneable; clones share the same lines.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    catalog: CatalogCache,
    storage: Arc<dyn CartStorage>,
    lines: RwLock<Vec<CartLine>>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("lines", &self.lines().len())
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Create a store and rehydrate it from `storage`.
    ///
    /// A missing blob starts an empty cart. An unreadable, unparseable or
    /// invalid blob is discarded with a warning and also starts empty.
    #[must_use]
    pub fn new(catalog: CatalogCache, storage: Arc<dyn CartStorage>) -> Self {
        let lines = rehydrate(storage.as_ref());
        debug!(lines = lines.len(), "Cart rehydrated");

        Self {
            inner: Arc::new(CartStoreInner {
                catalog,
                storage,
                lines: RwLock::new(lines),
            }),
        }
    }

    /// Add `quantity` of a product, or update the existing line.
    ///
    /// An existing line takes the new tier and period, has `quantity` added
    /// to it, and is re-priced, falling back to an estimate scaled from its
    /// current price. A new line has no price of its own yet, so it must
    /// match an enabled catalog plan.
    ///
    /// # Errors
    ///
    /// - `CartError::QuantityOutOfRange` if `quantity` is zero or the
    ///   resulting line quantity would exceed [`MAX_LINE_QUANTITY`]
    /// - `CartError::Pricing` if no price can be resolved
    ///
    /// The cart is unchanged on error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_or_update(
        &self,
        product_id: ProductId,
        plan_tier: PlanTier,
        billing_period: BillingPeriod,
        quantity: u32,
    ) -> Result<CartLine, CartError> {
        check_quantity(i64::from(quantity))?;

        let lookup = self.inner.catalog.lookup(&product_id).await;

        let mut lines = self.write_lines();
        let (previous, new_quantity) =
            match lines.iter().find(|line| line.product_id == product_id) {
                Some(line) => {
                    let total = i64::from(line.quantity) + i64::from(quantity);
                    (Some(line.previous_price()), check_quantity(total)?)
                }
                None => (None, quantity),
            };

        let quote = pricing::resolve(
            &product_id,
            &plan_tier,
            &billing_period,
            lookup.plans.as_deref(),
            previous.as_ref(),
        )?;

        let product_name = lookup.product.as_ref().map(|p| p.name.clone());
        let line = if let Some(line) = lines.iter_mut().find(|line| line.product_id == product_id) {
            line.quantity = new_quantity;
            line.plan_tier = plan_tier;
            line.billing_period = billing_period;
            if product_name.is_some() {
                line.product_name = product_name;
            }
            line.apply_quote(quote, &lookup);
            line.clone()
        } else {
            let mut line = CartLine {
                product_id,
                product_name,
                quantity: new_quantity,
                plan_tier,
                billing_period,
                resolved_unit_price: Decimal::ZERO,
                price_source: None,
                catalog_snapshot_ref: None,
            };
            line.apply_quote(quote, &lookup);
            lines.push(line.clone());
            line
        };

        debug!(
            quantity = line.quantity,
            price = %line.resolved_unit_price,
            source = ?line.price_source,
            "Cart line updated"
        );
        self.persist(&lines);
        Ok(line)
    }

    /// Set a line's quantity. `n <= 0` removes the line.
    ///
    /// The unit price is unaffected.
    ///
    /// # Errors
    ///
    /// - `CartError::LineNotFound` if the product is not in the cart
    /// - `CartError::QuantityOutOfRange` if `n` exceeds [`MAX_LINE_QUANTITY`]
    pub fn set_quantity(&self, product_id: &ProductId, n: i64) -> Result<(), CartError> {
        let mut lines = self.write_lines();
        let idx = lines
            .iter()
            .position(|line| &line.product_id == product_id)
            .ok_or_else(|| CartError::LineNotFound(product_id.clone()))?;

        if n <= 0 {
            lines.remove(idx);
            debug!(product_id = %product_id, "Cart line removed by zero quantity");
        } else if let Some(line) = lines.get_mut(idx) {
            line.quantity = check_quantity(n)?;
        }

        self.persist(&lines);
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the product is not in the cart.
    pub fn remove(&self, product_id: &ProductId) -> Result<CartLine, CartError> {
        let mut lines = self.write_lines();
        let idx = lines
            .iter()
            .position(|line| &line.product_id == product_id)
            .ok_or_else(|| CartError::LineNotFound(product_id.clone()))?;

        let removed = lines.remove(idx);
        self.persist(&lines);
        Ok(removed)
    }

    /// Remove every line.
    pub fn clear(&self) {
        let mut lines = self.write_lines();
        lines.clear();
        self.persist(&lines);
    }

    /// Remove lines still exactly as they were when `purchased` was taken.
    ///
    /// Lines added or changed since then stay in the cart.
    pub fn remove_purchased(&self, purchased: &[CartLine]) {
        let mut lines = self.write_lines();
        let before = lines.len();
        lines.retain(|line| !purchased.contains(line));
        debug!(removed = before - lines.len(), "Purchased lines removed");
        self.persist(&lines);
    }

    /// Change a line's tier or period and re-price it against the current
    /// catalog.
    ///
    /// # Errors
    ///
    /// - `CartError::LineNotFound` if the product is not in the cart
    /// - `CartError::Pricing` if no price can be resolved; the line keeps its
    ///   previous selection and price
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn change_plan(
        &self,
        product_id: &ProductId,
        change: PlanChange,
    ) -> Result<CartLine, CartError> {
        if !self.contains(product_id) {
            return Err(CartError::LineNotFound(product_id.clone()));
        }

        let lookup = self.inner.catalog.lookup(product_id).await;

        let mut lines = self.write_lines();
        let line = lines
            .iter_mut()
            .find(|line| &line.product_id == product_id)
            .ok_or_else(|| CartError::LineNotFound(product_id.clone()))?;

        let (plan_tier, billing_period) = match change {
            PlanChange::Tier(tier) => (tier, line.billing_period.clone()),
            PlanChange::Period(period) => (line.plan_tier.clone(), period),
        };

        let quote = pricing::resolve(
            product_id,
            &plan_tier,
            &billing_period,
            lookup.plans.as_deref(),
            Some(&line.previous_price()),
        )?;

        line.plan_tier = plan_tier;
        line.billing_period = billing_period;
        line.apply_quote(quote, &lookup);
        let updated = line.clone();

        debug!(
            tier = %updated.plan_tier,
            period = %updated.billing_period,
            price = %updated.resolved_unit_price,
            source = ?updated.price_source,
            "Cart line re-priced"
        );
        self.persist(&lines);
        Ok(updated)
    }

    /// Sum of unit price × quantity over all lines.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.read_lines().iter().map(CartLine::line_total).sum()
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.read_lines().iter().map(|line| line.quantity).sum()
    }

    /// Snapshot of the lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.read_lines().clone()
    }

    /// Look up a single line.
    #[must_use]
    pub fn line(&self, product_id: &ProductId) -> Option<CartLine> {
        self.read_lines()
            .iter()
            .find(|line| &line.product_id == product_id)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.read_lines()
            .iter()
            .any(|line| &line.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_lines().is_empty()
    }

    /// Lines, count and formatted total in `currency`, read under one lock.
    #[must_use]
    pub fn summary(&self, currency: CurrencyCode) -> CartSummary {
        let lines = self.read_lines();
        CartSummary {
            item_count: lines.iter().map(|line| line.quantity).sum(),
            total: Price::new(lines.iter().map(CartLine::line_total).sum(), currency),
            lines: lines.clone(),
        }
    }

    fn read_lines(&self) -> std::sync::RwLockReadGuard<'_, Vec<CartLine>> {
        self.inner
            .lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lines(&self) -> std::sync::RwLockWriteGuard<'_, Vec<CartLine>> {
        self.inner
            .lines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Write `lines` through to storage. Failures are logged; the in-memory
    /// cart stays authoritative.
    fn persist(&self, lines: &[CartLine]) {
        let persisted = PersistedCart {
            version: PERSISTED_VERSION,
            lines: lines.to_vec(),
        };

        let result = serde_json::to_string(&persisted)
            .map_err(|e| e.to_string())
            .and_then(|blob| {
                self.inner
                    .storage
                    .save(CART_STORAGE_KEY, &blob)
                    .map_err(|e| e.to_string())
            });

        if let Err(error) = result {
            warn!(error = %error, "Failed to persist cart");
        }
    }
}

fn check_quantity(n: i64) -> Result<u32, CartError> {
    u32::try_from(n)
        .ok()
        .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
        .ok_or(CartError::QuantityOutOfRange { quantity: n })
}

/// Read the persisted cart, discarding anything that is not a valid cart.
fn rehydrate(storage: &dyn CartStorage) -> Vec<CartLine> {
    let blob = match storage.load(CART_STORAGE_KEY) {
        Ok(Some(blob)) => blob,
        Ok(None) => return Vec::new(),
        Err(error) => {
            warn!(error = %error, "Failed to read persisted cart, starting empty");
            return Vec::new();
        }
    };

    let persisted: PersistedCart = match serde_json::from_str(&blob) {
        Ok(persisted) => persisted,
        Err(error) => {
            warn!(error = %error, "Persisted cart is corrupt, starting empty");
            return Vec::new();
        }
    };

    if persisted.version != PERSISTED_VERSION {
        warn!(version = persisted.version, "Unsupported persisted cart version, starting empty");
        return Vec::new();
    }

    let mut seen = std::collections::HashSet::new();
    let valid = persisted
        .lines
        .iter()
        .all(|line| line.is_valid() && seen.insert(line.product_id.clone()));
    if !valid {
        warn!("Persisted cart has invalid lines, starting empty");
        return Vec::new();
    }

    persisted.lines
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::{CatalogError, CatalogProvider, PricingPlan, Product};

    struct StaticProvider {
        products: Vec<Product>,
        plans: Vec<PricingPlan>,
    }

    #[async_trait]
    impl CatalogProvider for StaticProvider {
        async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError> {
            Ok(self.products.clone())
        }

        async fn fetch_pricing_plans(
            &self,
            product_ids: &[ProductId],
        ) -> Result<Vec<PricingPlan>, CatalogError> {
            Ok(self
                .plans
                .iter()
                .filter(|p| product_ids.contains(&p.product_id))
                .cloned()
                .collect())
        }
    }

    fn product(id: &str, base_price: Option<i64>) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            category: "streaming".to_string(),
            base_price: base_price.map(|p| Decimal::new(p, 0)),
            main_image_url: None,
        }
    }

    fn plan(id: &str, tier: PlanTier, monthly: Option<&str>, yearly: Option<&str>) -> PricingPlan {
        PricingPlan {
            product_id: ProductId::new(id),
            plan_tier: tier,
            monthly_price_raw: monthly.map(String::from),
            yearly_price_raw: yearly.map(String::from),
            enabled: true,
        }
    }

    fn store_with(storage: Arc<dyn CartStorage>) -> CartStore {
        let provider = StaticProvider {
            products: vec![
                product("p1", Some(1500)),
                product("p2", Some(1000)),
                product("p3", Some(999)),
                product("p4", Some(1000)),
            ],
            plans: vec![
                plan("p1", PlanTier::Shared, Some("₹1,400"), Some("₹11,200")),
                plan("p2", PlanTier::Shared, Some("₹1,000"), None),
                plan("p3", PlanTier::Shared, Some("Contact us"), None),
            ],
        };
        let catalog = CatalogCache::new(Arc::new(provider), Duration::from_secs(300));
        CartStore::new(catalog, storage)
    }

    fn store() -> CartStore {
        store_with(Arc::new(MemoryCartStorage::new()))
    }

    fn id(s: &str) -> ProductId {
        ProductId::new(s)
    }

    fn saved_line(product: &str, unit_price: i64) -> CartLine {
        CartLine {
            product_id: id(product),
            product_name: None,
            quantity: 1,
            plan_tier: PlanTier::Shared,
            billing_period: BillingPeriod::OneMonth,
            resolved_unit_price: Decimal::new(unit_price, 0),
            price_source: Some(PriceSource::Fallback),
            catalog_snapshot_ref: None,
        }
    }

    fn store_with_lines(lines: Vec<CartLine>) -> CartStore {
        let blob = serde_json::to_string(&PersistedCart {
            version: PERSISTED_VERSION,
            lines,
        })
        .unwrap();
        store_with(Arc::new(MemoryCartStorage::with_blob(CART_STORAGE_KEY, blob)))
    }

    #[tokio::test]
    async fn test_add_resolves_catalog_price() {
        let cart = store();
        let line = cart
            .add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();

        assert_eq!(line.resolved_unit_price, Decimal::new(1400, 0));
        assert_eq!(line.price_source, Some(PriceSource::Catalog));
        assert_eq!(line.product_name.as_deref(), Some("Product p1"));
        assert_eq!(
            line.catalog_snapshot_ref.as_ref().map(|r| r.raw_price.as_str()),
            Some("₹1,400")
        );
    }

    #[tokio::test]
    async fn test_change_period_uses_yearly_catalog_price() {
        let cart = store();
        cart.add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();

        let line = cart
            .change_plan(&id("p1"), PlanChange::Period(BillingPeriod::OneYear))
            .await
            .unwrap();

        assert_eq!(line.resolved_unit_price, Decimal::new(11200, 0));
        assert_eq!(line.price_source, Some(PriceSource::Catalog));
    }

    #[tokio::test]
    async fn test_change_tier_without_plans_uses_fallback() {
        let cart = store_with_lines(vec![saved_line("p4", 1000)]);

        let line = cart
            .change_plan(&id("p4"), PlanChange::Tier(PlanTier::Private))
            .await
            .unwrap();

        assert_eq!(line.resolved_unit_price, Decimal::new(2000, 0));
        assert_eq!(line.price_source, Some(PriceSource::Fallback));
        assert!(line.catalog_snapshot_ref.is_none());
    }

    #[tokio::test]
    async fn test_unparsable_price_on_new_line_is_rejected_despite_base_price() {
        let cart = store();
        let err = cart
            .add_or_update(id("p3"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, CartError::Pricing(PricingError::Unavailable { .. })));
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_new_line_is_not_priced_from_base_price() {
        let cart = store();
        let err = cart
            .add_or_update(id("p4"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, CartError::Pricing(PricingError::Unavailable { .. })));
        assert!(cart.line(&id("p4")).is_none());
    }

    #[tokio::test]
    async fn test_add_existing_increments_quantity() {
        let cart = store();
        cart.add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();
        let line = cart
            .add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 2)
            .await
            .unwrap();

        assert_eq!(line.quantity, 3);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.total(), Decimal::new(4200, 0));
        assert_eq!(cart.item_count(), 3);
    }

    #[tokio::test]
    async fn test_add_existing_updates_selection_and_price() {
        let cart = store();
        cart.add_or_update(id("p2"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();
        let line = cart
            .add_or_update(id("p2"), PlanTier::SemiPrivate, BillingPeriod::ThreeMonths, 1)
            .await
            .unwrap();

        // 1000 × 1.5 × 2.5
        assert_eq!(line.resolved_unit_price, Decimal::new(3750, 0));
        assert_eq!(line.quantity, 2);
    }

    #[tokio::test]
    async fn test_quantity_bounds() {
        let cart = store();
        let err = cart
            .add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::QuantityOutOfRange { quantity: 0 }));

        cart.add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 99)
            .await
            .unwrap();
        let err = cart
            .add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::QuantityOutOfRange { quantity: 100 }));
        assert_eq!(cart.line(&id("p1")).unwrap().quantity, 99);

        let err = cart.set_quantity(&id("p1"), 100).unwrap_err();
        assert!(matches!(err, CartError::QuantityOutOfRange { quantity: 100 }));
    }

    #[tokio::test]
    async fn test_set_quantity_keeps_unit_price_and_zero_removes() {
        let cart = store();
        cart.add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();

        cart.set_quantity(&id("p1"), 4).unwrap();
        let line = cart.line(&id("p1")).unwrap();
        assert_eq!(line.quantity, 4);
        assert_eq!(line.resolved_unit_price, Decimal::new(1400, 0));

        cart.set_quantity(&id("p1"), 0).unwrap();
        assert!(cart.is_empty());

        assert!(matches!(
            cart.set_quantity(&id("p1"), 1),
            Err(CartError::LineNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cart = store();
        cart.add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();
        cart.add_or_update(id("p2"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();

        let removed = cart.remove(&id("p1")).unwrap();
        assert_eq!(removed.product_id, id("p1"));
        assert!(matches!(cart.remove(&id("p1")), Err(CartError::LineNotFound(_))));

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_change_plan_missing_line() {
        let cart = store();
        let err = cart
            .change_plan(&id("p1"), PlanChange::Tier(PlanTier::Private))
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::LineNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_tier_falls_back_from_current_price() {
        let cart = store();
        cart.add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneYear, 1)
            .await
            .unwrap();

        let line = cart
            .change_plan(&id("p1"), PlanChange::Tier(PlanTier::Unknown("family".into())))
            .await
            .unwrap();

        assert_eq!(line.resolved_unit_price, Decimal::new(11200, 0));
        assert_eq!(line.price_source, Some(PriceSource::Fallback));
        assert_eq!(line.plan_tier, PlanTier::Unknown("family".into()));
    }

    #[tokio::test]
    async fn test_rejected_add_leaves_cart_unchanged() {
        let storage = Arc::new(MemoryCartStorage::new());
        let cart = store_with(Arc::clone(&storage) as Arc<dyn CartStorage>);
        cart.add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();
        let before = cart.lines();
        let persisted = storage.load(CART_STORAGE_KEY).unwrap();

        cart.add_or_update(id("p3"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap_err();

        assert_eq!(cart.lines(), before);
        assert_eq!(storage.load(CART_STORAGE_KEY).unwrap(), persisted);
    }

    #[tokio::test]
    async fn test_persists_and_rehydrates() {
        let storage: Arc<dyn CartStorage> = Arc::new(MemoryCartStorage::new());
        let cart = store_with(Arc::clone(&storage));
        cart.add_or_update(id("p1"), PlanTier::Shared, BillingPeriod::OneMonth, 2)
            .await
            .unwrap();
        cart.add_or_update(id("p2"), PlanTier::Shared, BillingPeriod::OneMonth, 1)
            .await
            .unwrap();

        let reloaded = store_with(storage);
        assert_eq!(reloaded.lines(), cart.lines());
        assert_eq!(reloaded.total(), Decimal::new(3800, 0));
    }

    #[test]
    fn test_corrupt_state_is_discarded() {
        for blob in [
            "not json",
            r#"{"version": 2, "lines": []}"#,
            r#"{"version": 1, "lines": [{"product_id": "p1", "quantity": 0, "plan_tier": "shared", "billing_period": "1_month", "resolved_unit_price": "10"}]}"#,
            r#"{"version": 1, "lines": [
                {"product_id": "p1", "quantity": 1, "plan_tier": "shared", "billing_period": "1_month", "resolved_unit_price": "10"},
                {"product_id": "p1", "quantity": 1, "plan_tier": "shared", "billing_period": "1_month", "resolved_unit_price": "10"}
            ]}"#,
        ] {
            let storage = MemoryCartStorage::with_blob(CART_STORAGE_KEY, blob);
            assert!(rehydrate(&storage).is_empty(), "blob should be discarded: {blob}");
        }
    }

    #[test]
    fn test_summary_formats_total() {
        let line = CartLine {
            product_id: id("p1"),
            product_name: None,
            quantity: 2,
            plan_tier: PlanTier::Shared,
            billing_period: BillingPeriod::OneYear,
            resolved_unit_price: Decimal::new(11200, 0),
            price_source: Some(PriceSource::Catalog),
            catalog_snapshot_ref: None,
        };
        let blob = serde_json::to_string(&PersistedCart {
            version: PERSISTED_VERSION,
            lines: vec![line],
        })
        .unwrap();

        let cart = store_with(Arc::new(MemoryCartStorage::with_blob(CART_STORAGE_KEY, blob)));
        let summary = cart.summary(CurrencyCode::INR);

        assert_eq!(summary.item_count, 2);
        assert_eq!(summary.formatted_total(), "₹22,400.00");
    }
}

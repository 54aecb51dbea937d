//! TTL cache in front of a [`CatalogProvider`].
//!
//! Three layers:
//! - `snapshots`: `moka` cache of full catalog reads keyed by product set;
//!   `try_get_with` coalesces concurrent misses onto a single fetch
//! - `last_good`: most recent successful snapshot per key, kept past expiry
//!   and served when the provider fails; bounded, least recently used keys
//!   are evicted first
//! - `plans`: per-product plan lists filled by background fetches for
//!   products the snapshots do not cover
//!
//! [`CatalogCache::reset`] bumps a generation counter; background fetches
//! started before a reset discard their results.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use subshare_core::ProductId;
use tracing::{debug, instrument, warn};

use super::{CatalogError, CatalogProvider, CatalogSnapshot, PricingPlan, Product};

/// Most product sets kept as failure fallbacks.
const LAST_GOOD_CAPACITY: u64 = 64;

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CatalogKey {
    All,
    Products(Vec<ProductId>),
}

impl CatalogKey {
    /// Build a key; the product set is sorted and deduplicated so the same
    /// set in a different order shares one entry.
    fn new(product_ids: Option<&[ProductId]>) -> Self {
        match product_ids {
            None => Self::All,
            Some(ids) => {
                let mut ids = ids.to_vec();
                ids.sort();
                ids.dedup();
                Self::Products(ids)
            }
        }
    }
}

/// What the catalog currently knows about one product.
#[derive(Debug, Clone, Default)]
pub struct CatalogLookup {
    /// Product metadata, if any snapshot lists it.
    pub product: Option<Product>,
    /// Plans for the product; `None` when no plans are cached yet.
    pub plans: Option<Arc<[PricingPlan]>>,
    /// When the plans were fetched.
    pub fetched_at: Option<chrono::DateTime<Utc>>,
}

/// Process-wide catalog cache.
///
/// Cheaply cloneable; clones share the same cache.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CatalogCacheInner>,
}

struct CatalogCacheInner {
    provider: Arc<dyn CatalogProvider>,
    snapshots: Cache<CatalogKey, Arc<CatalogSnapshot>>,
    last_good: Cache<CatalogKey, Arc<CatalogSnapshot>>,
    plans: Cache<ProductId, (chrono::DateTime<Utc>, Arc<[PricingPlan]>)>,
    plans_in_flight: Mutex<HashSet<ProductId>>,
    generation: AtomicU64,
}

impl CatalogCache {
    /// Create a cache over `provider` whose entries live for `ttl`.
    #[must_use]
    pub fn new(provider: Arc<dyn CatalogProvider>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CatalogCacheInner {
                provider,
                snapshots: Cache::builder().max_capacity(64).time_to_live(ttl).build(),
                last_good: Cache::builder()
                    .max_capacity(LAST_GOOD_CAPACITY)
                    .eviction_policy(EvictionPolicy::lru())
                    .build(),
                plans: Cache::builder().max_capacity(1000).time_to_live(ttl).build(),
                plans_in_flight: Mutex::new(HashSet::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Read the catalog, optionally restricted to `product_ids`.
    ///
    /// Fresh entries are served from cache. Concurrent misses for the same
    /// product set share one provider fetch. If the fetch fails, the last
    /// good snapshot is returned even when expired.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::CacheFetch` only if the fetch fails and no
    /// snapshot was ever cached for this product set.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        product_ids: Option<&[ProductId]>,
    ) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let key = CatalogKey::new(product_ids);
        let provider = Arc::clone(&self.inner.provider);
        let fetch_key = key.clone();

        let fetched = self
            .inner
            .snapshots
            .try_get_with(key.clone(), async move {
                fetch_snapshot(provider.as_ref(), &fetch_key)
                    .await
                    .map(Arc::new)
            })
            .await;

        match fetched {
            Ok(snapshot) => {
                self.remember(key, &snapshot).await;
                Ok(snapshot)
            }
            Err(err) => match self.inner.last_good.get(&key).await {
                Some(stale) => {
                    warn!(
                        error = %err,
                        fetched_at = %stale.fetched_at,
                        "Catalog fetch failed, serving stale snapshot"
                    );
                    Ok(stale)
                }
                None => Err(CatalogError::CacheFetch(err.to_string())),
            },
        }
    }

    /// Everything currently known about `product_id`.
    ///
    /// Reads the full catalog through [`CatalogCache::get`]. When the
    /// snapshot does not cover the product (or no snapshot is available),
    /// falls back to per-product plans from earlier background fetches,
    /// and if there are none, starts one without waiting for it.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn lookup(&self, product_id: &ProductId) -> CatalogLookup {
        let snapshot = match self.get(None).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(error = %err, "Catalog unavailable, pricing will use fallback");
                None
            }
        };

        let product = snapshot
            .as_ref()
            .and_then(|s| s.product(product_id).cloned());

        if let Some(snapshot) = &snapshot
            && let Some(plans) = snapshot.plans_for(product_id)
        {
            return CatalogLookup {
                product,
                plans: Some(plans),
                fetched_at: Some(snapshot.fetched_at),
            };
        }

        if let Some((fetched_at, plans)) = self.inner.plans.get(product_id).await {
            debug!("Per-product plans cache hit");
            return CatalogLookup {
                product,
                plans: Some(plans),
                fetched_at: Some(fetched_at),
            };
        }

        self.spawn_plan_fetch(product_id.clone());
        CatalogLookup {
            product,
            plans: None,
            fetched_at: None,
        }
    }

    /// Look up a single product's metadata.
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get`] errors.
    pub async fn product(&self, product_id: &ProductId) -> Result<Option<Product>, CatalogError> {
        Ok(self.get(None).await?.product(product_id).cloned())
    }

    /// Warm the cache for a product set ahead of use.
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get`] errors.
    pub async fn prefetch(&self, product_ids: &[ProductId]) -> Result<(), CatalogError> {
        self.get(Some(product_ids)).await.map(|_| ())
    }

    /// Force the next read to refetch. Last good snapshots are kept for
    /// failure fallback.
    pub fn invalidate(&self) {
        self.inner.snapshots.invalidate_all();
        self.inner.plans.invalidate_all();
        debug!("Catalog cache invalidated");
    }

    /// Drop all cached state, including failure fallbacks.
    ///
    /// Background plan fetches still running keep going but their results
    /// are discarded.
    pub fn reset(&self) {
        {
            let mut in_flight = self
                .inner
                .plans_in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            in_flight.clear();
        }
        self.invalidate();
        self.inner.last_good.invalidate_all();
    }

    /// Whether a background plan fetch is running for `product_id`.
    #[must_use]
    pub fn is_fetching_plans(&self, product_id: &ProductId) -> bool {
        self.inner
            .plans_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(product_id)
    }

    async fn remember(&self, key: CatalogKey, snapshot: &Arc<CatalogSnapshot>) {
        let unchanged = self
            .inner
            .last_good
            .get(&key)
            .await
            .is_some_and(|current| Arc::ptr_eq(&current, snapshot));
        if !unchanged {
            self.inner.last_good.insert(key, Arc::clone(snapshot)).await;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    /// Start a background plan fetch unless one is already running.
    fn spawn_plan_fetch(&self, product_id: ProductId) {
        let generation = {
            let mut in_flight = self
                .inner
                .plans_in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(product_id.clone()) {
                debug!(product_id = %product_id, "Plan fetch already in flight");
                return;
            }
            self.inner.generation.load(Ordering::SeqCst)
        };

        let cache = self.clone();
        tokio::spawn(async move {
            let ids = [product_id.clone()];
            match cache.inner.provider.fetch_pricing_plans(&ids).await {
                Ok(_) if !cache.is_current(generation) => {
                    debug!(product_id = %product_id, "Cache reset during plan fetch, discarding");
                }
                Ok(plans) => {
                    let plans: Vec<PricingPlan> = plans
                        .into_iter()
                        .filter(|plan| plan.product_id == product_id)
                        .collect();
                    debug!(product_id = %product_id, count = plans.len(), "Background plan fetch complete");
                    cache
                        .inner
                        .plans
                        .insert(product_id.clone(), (Utc::now(), Arc::from(plans)))
                        .await;
                    // A reset may have landed while inserting.
                    if !cache.is_current(generation) {
                        cache.inner.plans.invalidate(&product_id).await;
                    }
                }
                Err(err) => {
                    warn!(product_id = %product_id, error = %err, "Background plan fetch failed");
                }
            }
            let mut in_flight = cache
                .inner
                .plans_in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if cache.is_current(generation) {
                in_flight.remove(&product_id);
            }
        });
    }
}

/// Fetch products and plans for `key` from the provider.
async fn fetch_snapshot(
    provider: &dyn CatalogProvider,
    key: &CatalogKey,
) -> Result<CatalogSnapshot, CatalogError> {
    let mut products = provider.fetch_products().await?;

    let covered: Vec<ProductId> = match key {
        CatalogKey::All => products.iter().map(|p| p.id.clone()).collect(),
        CatalogKey::Products(ids) => {
            products.retain(|p| ids.contains(&p.id));
            ids.clone()
        }
    };

    let plans = if covered.is_empty() {
        Vec::new()
    } else {
        provider.fetch_pricing_plans(&covered).await?
    };

    debug!(
        products = products.len(),
        plans = plans.len(),
        "Fetched catalog from provider"
    );

    Ok(CatalogSnapshot::new(products, plans, &covered, Utc::now()))
}

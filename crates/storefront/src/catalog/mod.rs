//! Product catalog: types, provider seam, HTTP client and TTL cache.
//!
//! # Architecture
//!
//! - [`CatalogProvider`] is the narrow interface to the remote catalog
//!   (products + pricing plans); [`HttpCatalogProvider`] is the REST client
//! - [`CatalogCache`] wraps a provider with a `moka` TTL cache (5 minutes by
//!   default), coalesces concurrent fetches, and serves the last good
//!   snapshot when the provider is down
//!
//! The catalog is eventually consistent and may omit plans for some
//! products, so nothing here is authoritative for cart state; the cache can
//! be discarded at any time.

mod cache;
mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use subshare_core::{PlanTier, ProductId};
use thiserror::Error;

pub use cache::{CatalogCache, CatalogLookup};
pub use http::HttpCatalogProvider;

/// Errors that can occur when reading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog API returned a non-success status.
    #[error("Catalog API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid endpoint URL.
    #[error("Invalid catalog URL: {0}")]
    Url(#[from] url::ParseError),

    /// Fetch failed and there is no cached catalog to fall back on.
    #[error("Catalog unavailable and nothing cached: {0}")]
    CacheFetch(String),
}

/// A product as listed by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// Legacy single price, used as the fallback seed for new cart lines.
    #[serde(default)]
    pub base_price: Option<Decimal>,
    #[serde(default)]
    pub main_image_url: Option<String>,
}

/// A pricing plan for one tier of a product.
///
/// Prices arrive as free text ("₹1,400", "1400", "Contact us") and are only
/// interpreted by the pricing resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPlan {
    pub product_id: ProductId,
    pub plan_tier: PlanTier,
    #[serde(default, rename = "monthly_price")]
    pub monthly_price_raw: Option<String>,
    #[serde(default, rename = "yearly_price")]
    pub yearly_price_raw: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// One cached catalog read: products plus their plans, grouped by product.
///
/// Snapshots are immutable and replaced wholesale on refresh.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub products: Vec<Product>,
    pub plans_by_product: HashMap<ProductId, Arc<[PricingPlan]>>,
}

impl CatalogSnapshot {
    /// Group `plans` by product.
    ///
    /// Every id in `covered` gets an entry, empty when the provider returned
    /// no plans for it, so "known to have no plans" is distinguishable from
    /// "never fetched".
    #[must_use]
    pub fn new(
        products: Vec<Product>,
        plans: Vec<PricingPlan>,
        covered: &[ProductId],
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let mut grouped: HashMap<ProductId, Vec<PricingPlan>> = covered
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        for plan in plans {
            grouped.entry(plan.product_id.clone()).or_default().push(plan);
        }

        Self {
            fetched_at,
            products,
            plans_by_product: grouped
                .into_iter()
                .map(|(id, plans)| (id, Arc::from(plans)))
                .collect(),
        }
    }

    /// Look up a product by id.
    #[must_use]
    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.id == id)
    }

    /// Plans fetched for a product, if the product was covered by this read.
    #[must_use]
    pub fn plans_for(&self, id: &ProductId) -> Option<Arc<[PricingPlan]>> {
        self.plans_by_product.get(id).cloned()
    }
}

/// Source of products and pricing plans.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// List all products.
    async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError>;

    /// List pricing plans for the given products.
    async fn fetch_pricing_plans(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<PricingPlan>, CatalogError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_plan_wire_format() {
        let json = r#"{
            "product_id": "netflix",
            "plan_tier": "semi_private",
            "monthly_price": "₹1,400",
            "yearly_price": null
        }"#;
        let plan: PricingPlan = serde_json::from_str(json).unwrap();

        assert_eq!(plan.product_id, ProductId::new("netflix"));
        assert_eq!(plan.plan_tier, PlanTier::SemiPrivate);
        assert_eq!(plan.monthly_price_raw.as_deref(), Some("₹1,400"));
        assert!(plan.yearly_price_raw.is_none());
        assert!(plan.enabled);
    }

    #[test]
    fn test_product_base_price_accepts_number_or_string() {
        let from_number: Product =
            serde_json::from_str(r#"{"id":"a","name":"A","base_price":499}"#).unwrap();
        let from_string: Product =
            serde_json::from_str(r#"{"id":"a","name":"A","base_price":"499"}"#).unwrap();
        assert_eq!(from_number.base_price, Some(Decimal::new(499, 0)));
        assert_eq!(from_number, from_string);
    }

    #[test]
    fn test_snapshot_marks_covered_products_without_plans() {
        let plans = vec![PricingPlan {
            product_id: ProductId::new("p1"),
            plan_tier: PlanTier::Shared,
            monthly_price_raw: Some("100".to_string()),
            yearly_price_raw: None,
            enabled: true,
        }];
        let covered = [ProductId::new("p1"), ProductId::new("p2")];
        let snapshot = CatalogSnapshot::new(Vec::new(), plans, &covered, Utc::now());

        assert_eq!(snapshot.plans_for(&ProductId::new("p1")).unwrap().len(), 1);
        assert!(snapshot.plans_for(&ProductId::new("p2")).unwrap().is_empty());
        assert!(snapshot.plans_for(&ProductId::new("p3")).is_none());
    }
}

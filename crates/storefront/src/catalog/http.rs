//! REST client for the catalog API.
//!
//! Endpoints (relative to the configured base URL):
//! - `GET products` - JSON array of [`Product`]
//! - `GET pricing-plans?product_ids=a,b` - JSON array of [`PricingPlan`]

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use subshare_core::ProductId;
use tracing::instrument;
use url::Url;

use crate::config::BackendConfig;

use super::{CatalogError, CatalogProvider, PricingPlan, Product};

/// Catalog API client.
#[derive(Clone)]
pub struct HttpCatalogProvider {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<SecretString>,
}

impl std::fmt::Debug for HttpCatalogProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCatalogProvider")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpCatalogProvider {
    /// Create a new catalog client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    /// GET a JSON document from `url`.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Catalog API returned non-success status"
            );
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse catalog response"
            );
            CatalogError::Parse(e)
        })
    }
}

#[async_trait]
impl CatalogProvider for HttpCatalogProvider {
    #[instrument(skip(self))]
    async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError> {
        let url = self.base_url.join("products")?;
        self.get_json(url).await
    }

    #[instrument(skip(self), fields(count = product_ids.len()))]
    async fn fetch_pricing_plans(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<PricingPlan>, CatalogError> {
        let mut url = self.base_url.join("pricing-plans")?;
        let ids = product_ids
            .iter()
            .map(ProductId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        url.query_pairs_mut().append_pair("product_ids", &ids);

        self.get_json(url).await
    }
}

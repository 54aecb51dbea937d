//! REST client for the purchase backend (`POST {base}/purchases`).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::config::BackendConfig;

use super::{CheckoutError, PurchaseBackend, PurchaseRequest, PurchaseResponse};

/// Purchase API client.
#[derive(Clone)]
pub struct HttpPurchaseBackend {
    client: reqwest::Client,
    endpoint: Url,
    api_token: Option<SecretString>,
}

impl std::fmt::Debug for HttpPurchaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPurchaseBackend")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// Error body returned with non-success statuses.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpPurchaseBackend {
    /// Create a new purchase client.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Network` if the HTTP client fails to build,
    /// or `CheckoutError::Server` if the endpoint URL cannot be formed.
    pub fn new(config: &BackendConfig) -> Result<Self, CheckoutError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CheckoutError::Network(e.to_string()))?;
        let endpoint = config
            .base_url
            .join("purchases")
            .map_err(|e| CheckoutError::Server(format!("invalid purchase URL: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_token: config.api_token.clone(),
        })
    }
}

#[async_trait]
impl PurchaseBackend for HttpPurchaseBackend {
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    async fn submit(&self, request: &PurchaseRequest) -> Result<PurchaseResponse, CheckoutError> {
        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header("Accept", "application/json")
            .json(request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CheckoutError::Network(e.to_string()))?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let body = response
            .text()
            .await
            .map_err(|e| CheckoutError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Purchase API returned non-success status"
            );
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.or(b.message))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(CheckoutError::Server(message));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse purchase response"
            );
            CheckoutError::Server(format!("invalid purchase response: {e}"))
        })
    }
}

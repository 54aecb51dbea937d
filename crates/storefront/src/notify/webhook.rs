//! Posts order summaries to a webhook as JSON.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use subshare_core::{CurrencyCode, UserCode};
use url::Url;

use super::{Notifier, NotifyError, format_summary};
use crate::checkout::{Buyer, IssuedProductCode, PurchaseResult};

/// Webhook notifier.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
}

/// JSON body posted to the webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    text: String,
    buyer_name: &'a str,
    buyer_email: &'a str,
    user_code: &'a UserCode,
    is_returning_user: bool,
    product_codes: &'a [IssuedProductCode],
    total_amount: String,
    currency: CurrencyCode,
}

impl WebhookNotifier {
    /// Create a notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, buyer: &Buyer, result: &PurchaseResult) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            text: format_summary(buyer, result),
            buyer_name: buyer.name.trim(),
            buyer_email: buyer.email.trim(),
            user_code: &result.user_code,
            is_returning_user: result.is_returning_user,
            product_codes: &result.product_codes,
            total_amount: result.total_amount.to_string(),
            currency: result.currency,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

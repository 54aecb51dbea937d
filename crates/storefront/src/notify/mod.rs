//! Out-of-band order notifications.
//!
//! Notifiers subscribe to [`CheckoutEvent`]s and deliver a human-readable
//! summary of each completed purchase. Delivery is fire-and-forget: a failed
//! notification is logged and never affects the purchase.

pub mod webhook;

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use subshare_core::Price;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::checkout::{Buyer, CheckoutEvent, PurchaseResult};

pub use webhook::WebhookNotifier;

/// WhatsApp click-to-chat endpoint.
const WHATSAPP_BASE_URL: &str = "https://wa.me";

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Receiver returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// A channel that receives purchase summaries.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Deliver a summary of `result`.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if delivery failed.
    async fn notify(&self, buyer: &Buyer, result: &PurchaseResult) -> Result<(), NotifyError>;
}

/// Human-readable summary: buyer, user code and product codes.
#[must_use]
pub fn format_summary(buyer: &Buyer, result: &PurchaseResult) -> String {
    let mut out = format!("New order from {} ({})\n", buyer.name.trim(), buyer.email.trim());

    let customer = if result.is_returning_user {
        "returning customer"
    } else {
        "new customer"
    };
    let _ = writeln!(out, "User code: {} ({customer})", result.user_code);

    out.push_str("Product codes:\n");
    for code in &result.product_codes {
        let name = code
            .product_name
            .as_deref()
            .unwrap_or_else(|| code.product_id.as_str());
        let _ = writeln!(out, "- {} {name} ({})", code.code, code.status);
    }

    let _ = write!(
        out,
        "Total: {}",
        Price::new(result.total_amount, result.currency)
    );
    out
}

/// Click-to-chat link that opens WhatsApp with `text` prefilled.
#[must_use]
pub fn whatsapp_link(number: &str, text: &str) -> String {
    format!("{WHATSAPP_BASE_URL}/{number}?text={}", urlencoding::encode(text))
}

// =============================================================================
// Notifiers
// =============================================================================

/// Produces a WhatsApp click-to-chat link for the store's number.
///
/// Click-to-chat needs a person to press send, so delivery means logging the
/// link for whoever handles orders.
#[derive(Debug, Clone)]
pub struct WhatsAppNotifier {
    number: String,
}

impl WhatsAppNotifier {
    /// `number` is digits only, including the country code.
    #[must_use]
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
        }
    }

    #[must_use]
    pub fn link_for(&self, buyer: &Buyer, result: &PurchaseResult) -> String {
        whatsapp_link(&self.number, &format_summary(buyer, result))
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn notify(&self, buyer: &Buyer, result: &PurchaseResult) -> Result<(), NotifyError> {
        info!(
            user_code = %result.user_code,
            link = %self.link_for(buyer, result),
            "WhatsApp order summary ready"
        );
        Ok(())
    }
}

/// Writes the summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, buyer: &Buyer, result: &PurchaseResult) -> Result<(), NotifyError> {
        info!(summary = %format_summary(buyer, result), "Order completed");
        Ok(())
    }
}

/// Deliver every completed checkout to `notifiers` until the channel closes.
///
/// Each notifier runs independently; one failing does not stop the others.
#[must_use]
pub fn spawn_notification_listener(
    mut events: broadcast::Receiver<CheckoutEvent>,
    notifiers: Vec<Arc<dyn Notifier>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CheckoutEvent::Completed { buyer, result }) => {
                    for notifier in &notifiers {
                        match notifier.notify(&buyer, &result).await {
                            Ok(()) => debug!(notifier = notifier.name(), "Notification delivered"),
                            Err(e) => warn!(
                                notifier = notifier.name(),
                                user_code = %result.user_code,
                                error = %e,
                                "Notification failed"
                            ),
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification listener lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Notification listener stopped");
    })
}

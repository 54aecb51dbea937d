//! Checkout: turns cart lines into one purchase request per user action.
//!
//! Submissions are keyed by an attempt token derived from the request
//! contents. A submission for a token that is already in flight joins the
//! pending one instead of calling the backend again. The backend call runs
//! on its own task, so it completes even if every caller stops waiting.
//!
//! Successful purchases are announced on a broadcast channel as
//! [`CheckoutEvent::Completed`] for notification delivery.

pub mod http;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use subshare_core::{
    BillingPeriod, CurrencyCode, Email, EmailError, PlanTier, ProductCode, ProductCodeStatus,
    ProductId, UserCode,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cart::CartLine;

pub use http::HttpPurchaseBackend;

/// Buyer name length bounds, in characters after trimming.
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 100;

/// Namespace for attempt tokens.
const ATTEMPT_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_4b2e_9a57_4d0b_8e3a_2f61_c0d4_a915);

const EVENT_CAPACITY: usize = 64;

/// Buyer input that fails validation. Nothing is sent when this occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must be 2-100 characters (got {len})")]
    NameLength { len: usize },

    #[error("invalid email: {0}")]
    Email(#[from] EmailError),

    #[error("cart is empty")]
    EmptyCart,

    #[error("cart line {0} has no valid price")]
    InvalidLinePrice(ProductId),
}

/// Errors that can occur during checkout.
///
/// Clone so joined submissions can all receive the same outcome.
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request did not reach the backend, or no response came back.
    #[error("network error: {0}")]
    Network(String),

    /// The backend rejected or failed the purchase.
    #[error("server error: {0}")]
    Server(String),
}

// =============================================================================
// Wire Types
// =============================================================================

/// Who is buying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buyer {
    pub name: String,
    pub email: String,
}

/// One purchased unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItem {
    pub product_id: ProductId,
    pub plan_tier: PlanTier,
    pub billing_period: BillingPeriod,
    pub price: Decimal,
}

/// Body sent to the purchase backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub buyer_name: String,
    pub buyer_email: String,
    pub items: Vec<PurchaseItem>,
    pub currency: CurrencyCode,
}

impl PurchaseRequest {
    /// Sum of item prices.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items.iter().map(|item| item.price).sum()
    }

    /// Deterministic token identifying this logical request.
    #[must_use]
    pub fn attempt_token(&self) -> Uuid {
        let mut key = format!(
            "{}\n{}\n{}",
            self.buyer_email.to_lowercase(),
            self.buyer_name,
            self.currency
        );
        for item in &self.items {
            // Writing to a String cannot fail.
            let _ = write!(
                key,
                "\n{}|{}|{}|{}",
                item.product_id,
                item.plan_tier,
                item.billing_period,
                item.price.normalize()
            );
        }
        Uuid::new_v5(&ATTEMPT_NAMESPACE, key.as_bytes())
    }
}

/// A product code as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCodeResponse {
    pub code: ProductCode,
    pub product_id: ProductId,
    #[serde(default)]
    pub product_name: Option<String>,
}

/// Raw backend response.
///
/// Only `success` is required. Missing or `null` fields take their defaults
/// and the currency is kept as sent, so a successful purchase is never lost
/// to a formatting difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub success: bool,
    #[serde(default)]
    pub user_code: Option<UserCode>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_returning_user: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub product_codes: Vec<ProductCodeResponse>,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A product code issued by a purchase, awaiting external approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedProductCode {
    pub code: ProductCode,
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub status: ProductCodeStatus,
}

/// Terminal outcome of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseResult {
    pub user_code: UserCode,
    pub is_returning_user: bool,
    pub product_codes: Vec<IssuedProductCode>,
    pub total_amount: Decimal,
    pub currency: CurrencyCode,
}

impl PurchaseResult {
    /// Interpret a backend response for `request`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Server` when the backend reports failure or
    /// omits the user code.
    pub fn from_response(
        response: PurchaseResponse,
        request: &PurchaseRequest,
    ) -> Result<Self, CheckoutError> {
        if !response.success {
            return Err(CheckoutError::Server(
                response
                    .error
                    .unwrap_or_else(|| "purchase was not accepted".to_string()),
            ));
        }

        let user_code = response
            .user_code
            .ok_or_else(|| CheckoutError::Server("response is missing the user code".to_string()))?;

        let currency = match response.currency.as_deref().map(str::parse::<CurrencyCode>) {
            Some(Ok(currency)) => currency,
            Some(Err(e)) => {
                warn!(error = %e, fallback = %request.currency, "Unrecognized response currency");
                request.currency
            }
            None => request.currency,
        };

        Ok(Self {
            user_code,
            is_returning_user: response.is_returning_user,
            product_codes: response
                .product_codes
                .into_iter()
                .map(|code| IssuedProductCode {
                    code: code.code,
                    product_id: code.product_id,
                    product_name: code.product_name,
                    status: ProductCodeStatus::Pending,
                })
                .collect(),
            total_amount: response.total_amount.unwrap_or_else(|| request.total()),
            currency,
        })
    }
}

/// Emitted by the orchestrator after a purchase completes.
#[derive(Debug, Clone)]
pub enum CheckoutEvent {
    Completed {
        buyer: Buyer,
        result: PurchaseResult,
    },
}

/// Accepts purchase requests.
#[async_trait]
pub trait PurchaseBackend: Send + Sync {
    /// Submit `request` once.
    ///
    /// # Errors
    ///
    /// `CheckoutError::Network` for transport failures and
    /// `CheckoutError::Server` for backend-reported failures.
    async fn submit(&self, request: &PurchaseRequest) -> Result<PurchaseResponse, CheckoutError>;
}

// =============================================================================
// Request Assembly
// =============================================================================

/// Validate buyer input and project cart lines to a purchase request.
///
/// Each unit of a line becomes its own item at the line's last resolved
/// price, so every unit receives its own product code.
///
/// # Errors
///
/// Returns a `ValidationError` for a bad name or email, an empty cart, or a
/// line whose price is not positive.
pub fn build_request(
    buyer: &Buyer,
    lines: &[CartLine],
    currency: CurrencyCode,
) -> Result<PurchaseRequest, ValidationError> {
    let name = buyer.name.trim();
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::NameLength { len });
    }

    let email = Email::parse(&buyer.email)?;

    if lines.is_empty() {
        return Err(ValidationError::EmptyCart);
    }

    let mut items = Vec::new();
    for line in lines {
        let price = line.resolved_unit_price;
        if !price.is_sign_positive() || price.is_zero() {
            return Err(ValidationError::InvalidLinePrice(line.product_id.clone()));
        }
        items.extend((0..line.quantity).map(|_| PurchaseItem {
            product_id: line.product_id.clone(),
            plan_tier: line.plan_tier.clone(),
            billing_period: line.billing_period.clone(),
            price,
        }));
    }

    Ok(PurchaseRequest {
        buyer_name: name.to_string(),
        buyer_email: email.into_inner(),
        items,
        currency,
    })
}

// =============================================================================
// Orchestrator
// =============================================================================

type InFlight = Shared<BoxFuture<'static, Result<PurchaseResult, CheckoutError>>>;

/// Submits purchases with a per-attempt idempotency guard.
///
/// Cheaply cloneable; clones share the guard and event channel.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    backend: Arc<dyn PurchaseBackend>,
    currency: CurrencyCode,
    in_flight: Mutex<HashMap<Uuid, InFlight>>,
    events: broadcast::Sender<CheckoutEvent>,
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("currency", &self.inner.currency)
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl CheckoutOrchestrator {
    #[must_use]
    pub fn new(backend: Arc<dyn PurchaseBackend>, currency: CurrencyCode) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(OrchestratorInner {
                backend,
                currency,
                in_flight: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Subscribe to checkout events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
        self.inner.events.subscribe()
    }

    /// Number of submissions currently waiting on the backend.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Validate, build and submit a purchase for `lines`.
    ///
    /// Prices are sent exactly as resolved on the lines. An identical
    /// submission still in flight is joined rather than repeated. Failures
    /// are not retried; resubmitting after completion sends a new request.
    ///
    /// # Errors
    ///
    /// - `CheckoutError::Validation` before any network call
    /// - `CheckoutError::Network` / `CheckoutError::Server` from the backend
    #[instrument(skip(self, buyer, lines), fields(lines = lines.len()))]
    pub async fn submit(
        &self,
        buyer: &Buyer,
        lines: &[CartLine],
    ) -> Result<PurchaseResult, CheckoutError> {
        let request = build_request(buyer, lines, self.inner.currency)?;
        let token = request.attempt_token();

        let pending = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(pending) = in_flight.get(&token) {
                debug!(attempt = %token, "Joining in-flight checkout");
                pending.clone()
            } else {
                let pending = self.spawn_submission(token, buyer.clone(), request);
                in_flight.insert(token, pending.clone());
                pending
            }
        };

        pending.await
    }

    /// Run the backend call on its own task and return a joinable handle.
    ///
    /// Called with the in-flight lock held; the task removes its entry once
    /// the backend answers.
    fn spawn_submission(&self, token: Uuid, buyer: Buyer, request: PurchaseRequest) -> InFlight {
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            info!(attempt = %token, items = request.items.len(), "Submitting purchase");
            let result = match inner.backend.submit(&request).await {
                Ok(response) => PurchaseResult::from_response(response, &request),
                Err(err) => Err(err),
            };

            inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&token);

            match &result {
                Ok(result) => {
                    info!(
                        attempt = %token,
                        user_code = %result.user_code,
                        returning = result.is_returning_user,
                        codes = result.product_codes.len(),
                        "Purchase completed"
                    );
                    // No subscribers is fine.
                    let _ = inner.events.send(CheckoutEvent::Completed {
                        buyer,
                        result: result.clone(),
                    });
                }
                Err(err) => warn!(attempt = %token, error = %err, "Purchase failed"),
            }
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(CheckoutError::Network(format!("checkout task failed: {e}")))
            })
        }
        .boxed()
        .shared()
    }
}

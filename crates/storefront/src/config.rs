//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUBSHARE_CATALOG_URL` - Base URL of the catalog API (products, pricing plans)
//! - `SUBSHARE_PURCHASE_URL` - Base URL of the purchase backend
//!
//! ## Optional
//! - `SUBSHARE_API_TOKEN` - Bearer token sent to both backends
//! - `SUBSHARE_CACHE_TTL_SECS` - Catalog cache TTL (default: 300)
//! - `SUBSHARE_HTTP_TIMEOUT_SECS` - Timeout for catalog and purchase calls (default: 10)
//! - `SUBSHARE_CURRENCY` - Display and checkout currency (default: INR)
//! - `SUBSHARE_CART_DIR` - Directory holding the persisted cart (default: .subshare)
//! - `SUBSHARE_WHATSAPP_NUMBER` - Number that receives order summaries via click-to-chat
//! - `SUBSHARE_NOTIFY_WEBHOOK_URL` - Webhook that receives order summaries
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use subshare_core::CurrencyCode;
use thiserror::Error;
use url::Url;

/// Default catalog cache lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default bound on a single catalog or purchase HTTP call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Catalog API configuration
    pub catalog: BackendConfig,
    /// Purchase backend configuration
    pub purchase: BackendConfig,
    /// How long a fetched catalog stays fresh
    pub cache_ttl: Duration,
    /// Currency used for display and purchase requests
    pub currency: CurrencyCode,
    /// Directory holding the persisted cart blob
    pub cart_dir: PathBuf,
    /// Notification channel configuration
    pub notifications: NotificationConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Connection settings for one remote backend.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL, always ending in `/` so relative joins stay under it
    pub base_url: Url,
    /// Optional bearer token
    pub api_token: Option<SecretString>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BackendConfig {
    /// Build a config for `base_url` with the default timeout and no token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL does not parse.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url("base_url", base_url)?,
            api_token: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }
}

/// Where order summaries are delivered after a successful checkout.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    /// WhatsApp number (digits only, with country code)
    pub whatsapp_number: Option<String>,
    /// Webhook receiving a JSON summary
    pub webhook_url: Option<Url>,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// or if the API token looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`EngineConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_token = lookup("SUBSHARE_API_TOKEN")
            .map(|token| {
                validate_secret_strength(&token, "SUBSHARE_API_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;

        let timeout = Duration::from_secs(parse_or_default(
            &lookup,
            "SUBSHARE_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT.as_secs(),
        )?);
        let cache_ttl = Duration::from_secs(parse_or_default(
            &lookup,
            "SUBSHARE_CACHE_TTL_SECS",
            DEFAULT_CACHE_TTL.as_secs(),
        )?);

        let catalog = BackendConfig {
            base_url: required_url(&lookup, "SUBSHARE_CATALOG_URL")?,
            api_token: api_token.clone(),
            timeout,
        };
        let purchase = BackendConfig {
            base_url: required_url(&lookup, "SUBSHARE_PURCHASE_URL")?,
            api_token,
            timeout,
        };

        let currency = match lookup("SUBSHARE_CURRENCY") {
            Some(raw) => raw.parse::<CurrencyCode>().map_err(|e| {
                ConfigError::InvalidEnvVar("SUBSHARE_CURRENCY".to_string(), e)
            })?,
            None => CurrencyCode::default(),
        };

        let cart_dir = lookup("SUBSHARE_CART_DIR").map_or_else(|| PathBuf::from(".subshare"), PathBuf::from);

        let webhook_url = lookup("SUBSHARE_NOTIFY_WEBHOOK_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("SUBSHARE_NOTIFY_WEBHOOK_URL".to_string(), e.to_string())
                })
            })
            .transpose()?;

        let whatsapp_number = lookup("SUBSHARE_WHATSAPP_NUMBER")
            .map(|raw| normalize_phone(&raw))
            .transpose()?;

        Ok(Self {
            catalog,
            purchase,
            cache_ttl,
            currency,
            cart_dir,
            notifications: NotificationConfig {
                whatsapp_number,
                webhook_url,
            },
            sentry_dsn: lookup("SENTRY_DSN"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required URL-valued variable.
fn required_url(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Url, ConfigError> {
    let raw = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    parse_base_url(key, &raw)
}

/// Parse a base URL, appending a trailing slash so `Url::join` keeps the path.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Get a numeric variable with a default value.
fn parse_or_default(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Strip formatting from a phone number, keeping digits only.
fn normalize_phone(raw: &str) -> Result<String, ConfigError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 8 {
        return Err(ConfigError::InvalidEnvVar(
            "SUBSHARE_WHATSAPP_NUMBER".to_string(),
            "expected a full number with country code".to_string(),
        ));
    }
    Ok(digits)
}

/// Validate that a secret is not a placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

//! SubShare CLI - browse the catalog, manage the cart and check out.
//!
//! # Usage
//!
//! ```bash
//! # List products with their catalog prices
//! subshare catalog
//!
//! # Price a selection without touching the cart
//! subshare quote netflix --tier private --period 1_year
//!
//! # Manage the persistent cart
//! subshare cart add netflix --tier shared --period 1_month
//! subshare cart plan netflix --period 1_year
//! subshare cart set netflix 2
//! subshare cart show
//!
//! # Submit the cart
//! subshare checkout --name "Asha Rao" --email asha@example.com
//! ```
//!
//! Configuration comes from the environment (see `subshare_storefront::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use subshare_core::{BillingPeriod, PlanTier, ProductId};
use subshare_storefront::Storefront;
use subshare_storefront::config::EngineConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// How long to wait for pending notifications before exiting.
const NOTIFY_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "subshare")]
#[command(author, version, about = "SubShare storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products and their catalog plan prices
    Catalog {
        /// Bypass the cache and refetch
        #[arg(long)]
        refresh: bool,
    },
    /// Resolve the price of a selection
    Quote {
        /// Product ID
        product: String,

        /// Plan tier (`shared`, `semi_private`, `private`)
        #[arg(short, long, default_value = "shared")]
        tier: String,

        /// Billing period (`1_month`, `3_months`, `6_months`, `1_year`, `2_years`, `lifetime`)
        #[arg(short, long, default_value = "1_month")]
        period: String,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Submit the cart as a purchase
    Checkout {
        /// Buyer name
        #[arg(short, long)]
        name: String,

        /// Buyer email address
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Add a product, or add to an existing line
    Add {
        /// Product ID
        product: String,

        /// Plan tier
        #[arg(short, long, default_value = "shared")]
        tier: String,

        /// Billing period
        #[arg(short, long, default_value = "1_month")]
        period: String,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity (0 or less removes it)
    Set {
        /// Product ID
        product: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Change a line's tier and/or period
    Plan {
        /// Product ID
        product: String,

        /// New plan tier
        #[arg(short, long)]
        tier: Option<String>,

        /// New billing period
        #[arg(short, long)]
        period: Option<String>,
    },
    /// Remove a line
    Remove {
        /// Product ID
        product: String,
    },
    /// Remove every line
    Clear,
    /// Show the cart
    Show,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: Option<&EngineConfig>) -> Option<sentry::ClientInitGuard> {
    let dsn = config?.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration first so Sentry can start before tracing
    let config = EngineConfig::from_env();
    let _sentry_guard = init_sentry(config.as_ref().ok());

    // Defaults to warnings only so command output stays readable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "subshare_storefront=warn,subshare_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    let storefront = match Storefront::init(&config) {
        Ok(storefront) => storefront,
        Err(e) => {
            e.report();
            std::process::exit(1);
        }
    };
    let notifications = storefront.spawn_notifications();

    let result = run(cli, &storefront).await;

    // Dropping the last handle closes the event channel so the listener
    // finishes delivering and exits.
    drop(storefront);
    if tokio::time::timeout(NOTIFY_DRAIN_TIMEOUT, notifications)
        .await
        .is_err()
    {
        tracing::warn!("Timed out delivering notifications");
    }

    if let Err(e) = result {
        e.report();
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, storefront: &Storefront) -> Result<(), subshare_storefront::EngineError> {
    match cli.command {
        Commands::Catalog { refresh } => commands::catalog::list(storefront, refresh).await?,
        Commands::Quote {
            product,
            tier,
            period,
        } => {
            commands::catalog::quote(
                storefront,
                &ProductId::new(product),
                &PlanTier::from(tier),
                &BillingPeriod::from(period),
            )
            .await?;
        }
        Commands::Cart { action } => match action {
            CartAction::Add {
                product,
                tier,
                period,
                quantity,
            } => {
                commands::cart::add(
                    storefront,
                    ProductId::new(product),
                    PlanTier::from(tier),
                    BillingPeriod::from(period),
                    quantity,
                )
                .await?;
            }
            CartAction::Set { product, quantity } => {
                commands::cart::set_quantity(storefront, &ProductId::new(product), quantity)?;
            }
            CartAction::Plan {
                product,
                tier,
                period,
            } => {
                commands::cart::change_plan(
                    storefront,
                    &ProductId::new(product),
                    tier.map(PlanTier::from),
                    period.map(BillingPeriod::from),
                )
                .await?;
            }
            CartAction::Remove { product } => {
                commands::cart::remove(storefront, &ProductId::new(product))?;
            }
            CartAction::Clear => commands::cart::clear(storefront),
            CartAction::Show => commands::cart::show(storefront),
        },
        Commands::Checkout { name, email } => {
            commands::checkout::submit(storefront, name, email).await?;
        }
    }
    Ok(())
}

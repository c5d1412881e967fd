//! membership-server
//!
//! Axum server exposing membership checkout, the billing portal, the Stripe
//! webhook and per-item access checks.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use membership_core::{MemoryCatalog, MemoryLedger};

use crate::config::ServerConfig;
use crate::state::{AppState, Billing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env();

    // Relational storage is external; the in-memory stores serve local runs.
    let ledger = Arc::new(MemoryLedger::new());
    let catalog = Arc::new(MemoryCatalog::new());
    tracing::warn!("Using in-memory subscription ledger and content catalog");

    let billing = config.stripe.map(|stripe| {
        tracing::info!("✓ Stripe configured");
        Arc::new(Billing::new(
            Arc::new(stripe),
            ledger.clone(),
            ledger.clone(),
            &config.app_base_url,
        ))
    });

    if billing.is_none() {
        tracing::warn!("⚠ Stripe not configured - payments disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
    }

    let state = AppState {
        ledger: ledger.clone(),
        profiles: ledger,
        catalog,
        billing,
    };

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("membership-server running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                          - Health check");
    tracing::info!("  GET  /api/content/{{id}}/access         - Access decision");
    tracing::info!("  GET  /api/members/{{id}}/content        - Member page feed");
    tracing::info!("  POST /api/checkout                    - Create checkout session");
    tracing::info!("  POST /api/checkout/retrieve           - Checkout session detail");
    tracing::info!("  POST /api/customer-portal             - Billing portal session");
    tracing::info!("  POST /api/memberships/price           - Create membership price");
    tracing::info!("  POST /webhook/stripe                  - Stripe webhook");

    axum::serve(listener, app).await?;

    Ok(())
}

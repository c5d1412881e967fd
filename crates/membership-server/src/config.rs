//! Server Configuration
//!
//! Read from the environment after `.env` has been loaded.

use membership_payments::StripeClient;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Runtime configuration
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_addr: String,

    /// Public origin for checkout success/cancel and portal return URLs
    pub app_base_url: String,

    /// Stripe client (None if not configured; payment endpoints answer 503)
    pub stripe: Option<StripeClient>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let stripe = match StripeClient::from_env() {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("Stripe not configured: {}", e);
                None
            }
        };

        Self {
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
            app_base_url: env_or("APP_BASE_URL", DEFAULT_BASE_URL),
            stripe,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.into())
}

use std::env;

use thiserror::Error;

use crate::payments::PaypalEnv;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {0}: {1}")]
    InvalidVar(&'static str, String),
}

/// Server configuration, loaded once at startup.
///
/// Every provider credential is required: the server refuses to start with a
/// partial payment setup rather than failing per-request later.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// The storefront origin allowed by CORS (e.g. https://www.example.de).
    pub allowed_origin: String,

    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,

    pub paypal_client_id: String,
    pub paypal_client_secret: String,
    /// Webhook id registered in the PayPal dashboard; target of the
    /// verify-webhook-signature call.
    pub paypal_webhook_id: String,
    pub paypal_env: PaypalEnv,

    /// How long processed webhook event ids are kept for deduplication.
    pub webhook_event_retention_days: i64,
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = match env::var("PORT") {
            Ok(p) => p
                .parse()
                .map_err(|_| ConfigError::InvalidVar("PORT", p.clone()))?,
            Err(_) => 3000,
        };

        let paypal_env = match env::var("PAYPAL_ENV") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidVar("PAYPAL_ENV", v.clone()))?,
            Err(_) => PaypalEnv::Sandbox,
        };

        let webhook_event_retention_days = match env::var("WEBHOOK_EVENT_RETENTION_DAYS") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidVar("WEBHOOK_EVENT_RETENTION_DAYS", v.clone()))?,
            Err(_) => 30,
        };

        Ok(Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "grundbuch.db".to_string()),
            allowed_origin: require("ALLOWED_ORIGIN")?,
            stripe_secret_key: require("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            paypal_client_id: require("PAYPAL_CLIENT_ID")?,
            paypal_client_secret: require("PAYPAL_CLIENT_SECRET")?,
            paypal_webhook_id: require("PAYPAL_WEBHOOK_ID")?,
            paypal_env,
            webhook_event_retention_days,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

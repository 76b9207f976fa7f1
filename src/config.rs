use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

/// Process-level configuration, loaded from the environment.
///
/// Merchant credentials and payment-method settings live in
/// [`crate::settings::GatewayConfig`] and are resolved per purchase context,
/// not here.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// Base URL of the payment processor API, e.g. `https://payport.novalnet.de/v2`.
    pub gateway_base_url: String,
    /// Hostname webhook requests must originate from (resolved to an IP at
    /// request time).
    pub webhook_allowed_host: String,
    /// Public base URL of this service, used to build return URLs.
    pub public_base_url: String,
    /// Path to the JSON file holding the merchant gateway configuration.
    pub gateway_config_path: String,
}

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://payport.novalnet.de/v2";
pub const DEFAULT_WEBHOOK_ALLOWED_HOST: &str = "pay-nn.de";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_BASE_URL.to_string()),
            webhook_allowed_host: env::var("WEBHOOK_ALLOWED_HOST")
                .unwrap_or_else(|_| DEFAULT_WEBHOOK_ALLOWED_HOST.to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gateway_config_path: env::var("GATEWAY_CONFIG_PATH")
                .unwrap_or_else(|_| "gateway_config.json".to_string()),
        })
    }
}

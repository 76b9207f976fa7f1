//! Merchant-side gateway configuration.
//!
//! Credentials and per-method settings are merchant data, not process
//! configuration, so they are resolved per purchase context through
//! [`ConfigResolver`] rather than read from the environment. The default
//! resolver loads a single JSON document from disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::AppError;
use crate::payment::PaymentType;

/// What the gateway should do with the funds at checkout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentAction {
    #[default]
    Payment,
    Authorize,
}

/// Per-method merchant settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MethodSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub action: PaymentAction,
    /// Minimum amount (minor units) from which an authorize-capable method is
    /// put on hold instead of charged. Kept as a string because merchants
    /// paste arbitrary values here; anything non-numeric means "no limit".
    #[serde(default)]
    pub authorize_min_amount: Option<String>,
    /// Due date in days for methods that support one.
    #[serde(default)]
    pub due_date: Option<u32>,
    /// Offered instalment cycle counts, e.g. `[2, 3, 6, 12]`.
    #[serde(default)]
    pub instalment_cycles: Vec<u32>,
    /// Offer the non-guaranteed variant when the guarantee check fails.
    #[serde(default)]
    pub force_non_guarantee: bool,
    /// Extend the guarantee country set to the B2B list for company customers.
    #[serde(default)]
    pub allow_b2b: bool,
}

/// The merchant account configuration shared by all methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Merchant API signature (public key).
    pub signature: String,
    /// Payment access key. Never logged; feeds checksums and the
    /// `X-NN-Access-Key` header.
    pub access_key: String,
    pub tariff: String,
    /// Merchant accounts running in test mode list their signatures here.
    #[serde(default)]
    pub test_signatures: Vec<String>,
    /// Accept webhooks without the sender IP check. Test setups only.
    #[serde(default)]
    pub webhook_test_mode: bool,
    /// Address to notify on manually held (authorized) payments.
    #[serde(default)]
    pub onhold_notify_email: Option<String>,
    /// Address receiving a copy of every processed webhook message.
    #[serde(default)]
    pub webhook_notify_email: Option<String>,
    #[serde(default)]
    pub methods: BTreeMap<String, MethodSettings>,
}

impl GatewayConfig {
    pub fn method(&self, ty: PaymentType) -> MethodSettings {
        self.methods.get(ty.code()).cloned().unwrap_or_default()
    }

    pub fn enabled_methods(&self) -> Vec<PaymentType> {
        self.methods
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .filter_map(|(code, _)| PaymentType::from_code(code))
            .collect()
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_signatures.iter().any(|sig| *sig == self.signature)
    }
}

/// Resolves the gateway configuration for a purchase context. Multi-tenant
/// deployments implement this against their own account storage.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn resolve(&self, account: &str) -> Result<Arc<GatewayConfig>, AppError>;
}

/// Single-merchant resolver backed by one JSON file.
pub struct StaticResolver {
    config: Arc<GatewayConfig>,
}

impl StaticResolver {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: GatewayConfig = serde_json::from_str(&raw)?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl ConfigResolver for StaticResolver {
    async fn resolve(&self, _account: &str) -> Result<Arc<GatewayConfig>, AppError> {
        Ok(Arc::clone(&self.config))
    }
}

//! Asynchronous event notifications from the processor.
//!
//! Every notification passes authentication ([`authenticate`]), is matched to
//! a local record ([`correlate`]) and then applied by the per-event handlers
//! ([`dispatch`]). Whatever happens, the endpoint answers HTTP 200 with a
//! `{"message": ...}` body; the reply text is for the processor's log, not a
//! control channel.

pub mod authenticate;
pub mod correlate;
pub mod dispatch;

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::gateway::types::{string_or_number, InstalmentInfo, ResultInfo, TransactionInfo};
pub use crate::gateway::types::CustomFields;
use crate::lifecycle::PaymentContext;
use crate::notify::Notification;
use crate::settings::ConfigResolver;

#[derive(Debug, Clone, Deserialize)]
pub struct EventSection {
    #[serde(default, deserialize_with = "string_or_number")]
    pub tid: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub parent_tid: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerchantIdentity {
    #[serde(default, deserialize_with = "string_or_number")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookTransaction {
    #[serde(flatten)]
    pub info: TransactionInfo,
    /// Set on TRANSACTION_UPDATE events.
    #[serde(default)]
    pub update_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSection {
    #[serde(default, deserialize_with = "string_or_number")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: Option<EventSection>,
    #[serde(default)]
    pub merchant: Option<MerchantIdentity>,
    #[serde(default)]
    pub result: Option<ResultInfo>,
    #[serde(default)]
    pub transaction: Option<WebhookTransaction>,
    #[serde(default)]
    pub instalment: Option<InstalmentInfo>,
    #[serde(default)]
    pub custom: Option<CustomFields>,
    #[serde(default)]
    pub collection: Option<CollectionSection>,
}

/// Body of every webhook response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookReply {
    pub message: String,
}

impl WebhookReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub struct WebhookProcessor {
    pub ctx: PaymentContext,
    pub resolver: Arc<dyn ConfigResolver>,
    /// Hostname webhook senders must resolve to.
    pub allowed_host: String,
}

impl WebhookProcessor {
    /// Runs a raw notification through the full pipeline.
    pub async fn process(&self, client_ip: IpAddr, body: &[u8]) -> WebhookReply {
        let config = match self.resolver.resolve("default").await {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "gateway configuration unavailable");
                return WebhookReply::new("Merchant configuration is not available.");
            }
        };

        if !config.webhook_test_mode {
            match authenticate::sender_allowed(&self.allowed_host, client_ip).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(%client_ip, "webhook sender rejected");
                    return WebhookReply::new(format!(
                        "Unauthorised access from the IP {client_ip}"
                    ));
                }
                Err(err) => {
                    warn!(error = %err, "webhook host resolution failed");
                    return WebhookReply::new(
                        "Unauthorised access. Processor host could not be resolved.",
                    );
                }
            }
        }

        let payload: WebhookPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(_) => {
                return WebhookReply::new("Received. But the payload is not valid JSON.");
            }
        };

        if let Err(reply) = authenticate::validate_payload(&payload, &config) {
            return reply;
        }

        let event_type = payload
            .event
            .as_ref()
            .and_then(|e| e.event_type.clone())
            .unwrap_or_default();
        info!(%event_type, "webhook accepted");

        match dispatch::handle_event(&self.ctx, &config, &payload).await {
            Ok(reply) => {
                if let Some(email) = &config.webhook_notify_email {
                    let mail = Notification::Merchant {
                        email: email.clone(),
                        subject: format!("Novalnet webhook: {event_type}"),
                        body: reply.message.clone(),
                    };
                    if let Err(err) = self.ctx.notifier.send(mail).await {
                        warn!(error = %err, "webhook notification mail failed");
                    }
                }
                reply
            }
            Err(err) => {
                warn!(error = %err, %event_type, "webhook handling failed");
                WebhookReply::new(format!("Webhook processing failed: {err}"))
            }
        }
    }
}

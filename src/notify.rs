//! Outbound notifications and the status-to-outcome mapping used after a
//! processor status fetch.

use async_trait::async_trait;
use serde::Serialize;

use crate::comments;
use crate::db::models::{GatewayStatus, TransactionRecord};
use crate::error::AppError;

/// A mail queued for delivery. Transport is the embedding shop's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Customer {
        email: String,
        subject: String,
        body: String,
    },
    /// Merchant-side alert, e.g. a payment waiting for manual capture.
    Merchant {
        email: String,
        subject: String,
        body: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), AppError>;
}

/// Default notifier writing mails to the log. Deployments hook up their mail
/// transport here.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), AppError> {
        match &notification {
            Notification::Customer { email, subject, .. } => {
                tracing::info!(recipient = %email, %subject, "customer notification queued");
            }
            Notification::Merchant { email, subject, .. } => {
                tracing::info!(recipient = %email, %subject, "merchant notification queued");
            }
        }
        Ok(())
    }
}

/// Where to send the customer after the processor reported a status, and what
/// to tell them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDisposition {
    Success,
    Pending,
    /// Payment authorized, waiting for manual capture. Routed like a success
    /// but additionally alerts the merchant.
    Authorized,
    Error,
    CannotProcess,
}

impl SyncDisposition {
    pub fn from_status(status: GatewayStatus) -> Self {
        match status {
            GatewayStatus::Confirmed => Self::Success,
            GatewayStatus::Pending => Self::Pending,
            GatewayStatus::OnHold => Self::Authorized,
            GatewayStatus::Failure | GatewayStatus::Deactivated => Self::Error,
        }
    }
}

/// Customer mail summarizing the payment state, sent after finalization and
/// on reminder events.
pub fn compose_status_email(record: &TransactionRecord, message: &str) -> Notification {
    let body = format!(
        "{message}\n\nOrder reference: {}\nAmount: {}\n\n{}",
        record.order_ref,
        comments::format_amount(record.amount, &record.currency),
        record.comments,
    );
    Notification::Customer {
        email: record.customer_email.clone(),
        subject: format!("Payment status for order {}", record.order_ref),
        body,
    }
}

/// Merchant alert for a transaction put on hold.
pub fn compose_onhold_email(record: &TransactionRecord, merchant_email: &str) -> Notification {
    Notification::Merchant {
        email: merchant_email.to_string(),
        subject: format!(
            "Order {} needs your attention: payment on hold",
            record.order_ref
        ),
        body: format!(
            "The payment for order {} (TID {}) of {} is authorized and waiting for capture.",
            record.order_ref,
            record.tid,
            comments::format_amount(record.amount, &record.currency),
        ),
    }
}

//! Synchronous return from the hosted page.
//!
//! The redirect back carries the transaction id, a per-transaction secret and
//! a checksum; only after the checksum holds is the authoritative transaction
//! state fetched from the processor and persisted.

use serde::Deserialize;
use tracing::info;

use crate::checksum;
use crate::error::AppError;
use crate::lifecycle::{self, PaymentContext, PurchaseIntent};
use crate::notify::SyncDisposition;
use crate::settings::GatewayConfig;

/// Query parameters of the redirect back from the hosted page.
#[derive(Debug, Clone, Deserialize)]
pub struct ReturnParams {
    pub order_ref: String,
    pub tid: String,
    pub txn_secret: String,
    pub status: String,
    pub checksum: String,
    #[serde(default)]
    pub status_text: Option<String>,
}

/// What the customer should see after the return.
#[derive(Debug, Clone)]
pub enum ReturnOutcome {
    Completed {
        disposition: SyncDisposition,
        message: String,
        tid: String,
    },
    Failed {
        message: String,
    },
}

const HASH_FAILED_MESSAGE: &str =
    "While redirecting some of the data has been changed. The hash check failed.";

pub async fn handle_return(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    params: &ReturnParams,
) -> Result<ReturnOutcome, AppError> {
    let expected = checksum::return_checksum(
        &params.tid,
        &params.txn_secret,
        &params.status,
        &config.access_key,
    );
    if !checksum::verify(&expected, &params.checksum) {
        info!(order_ref = %params.order_ref, "return redirect failed the hash check");
        return Ok(ReturnOutcome::Failed {
            message: HASH_FAILED_MESSAGE.to_string(),
        });
    }

    if params.status != "SUCCESS" {
        ctx.store.delete_session(&params.order_ref).await?;
        let message = params
            .status_text
            .clone()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| {
                "The payment could not be processed. Please try again.".to_string()
            });
        return Ok(ReturnOutcome::Failed { message });
    }

    // The redirect only proves the customer came back; the transaction state
    // comes from the processor.
    let details = ctx.client.transaction_details(config, &params.tid).await?;

    // The checksum does not cover the order reference, so it has to match the
    // one echoed back with the transaction. Otherwise a valid redirect could
    // be replayed against another pending session.
    if let Some(echoed) = details.custom.as_ref().and_then(|custom| custom.order_ref()) {
        if echoed != params.order_ref {
            info!(
                order_ref = %params.order_ref,
                echoed,
                tid = %params.tid,
                "return redirect order reference does not match the transaction"
            );
            return Err(AppError::Validation(
                "order reference does not match the transaction".into(),
            ));
        }
    }

    let session = ctx.store.find_session(&params.order_ref).await?;
    let intent = match session {
        Some(session) => PurchaseIntent {
            order_ref: session.order_ref.clone(),
            user_id: session.user_id,
            product_id: session.product_id,
            customer_email: session.customer_email.clone(),
        },
        None => {
            // The webhook may have won the race; fall back to its record.
            if let Some(record) = ctx.store.find_by_tid(&params.tid).await? {
                return Ok(ReturnOutcome::Completed {
                    disposition: SyncDisposition::from_status(record.gateway_status),
                    message: "Your payment has already been processed.".to_string(),
                    tid: record.tid,
                });
            }
            return Ok(ReturnOutcome::Failed {
                message: "The payment session has expired.".to_string(),
            });
        }
    };

    let outcome = if details.result.is_success() {
        let record = lifecycle::finalize_success(ctx, config, &intent, &details).await?;
        ReturnOutcome::Completed {
            disposition: SyncDisposition::from_status(record.gateway_status),
            message: "Your payment has been processed.".to_string(),
            tid: record.tid,
        }
    } else {
        ReturnOutcome::Failed {
            message: lifecycle::failure_message(&details.result),
        }
    };
    ctx.store.delete_session(&params.order_ref).await?;

    Ok(outcome)
}

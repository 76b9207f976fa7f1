//! Transaction finalization after the processor reported a result.
//!
//! Both the synchronous return flow and the PAYMENT webhook funnel into
//! [`finalize_success`] / [`finalize_failure`]; the record store keeps the
//! outcome and the product catalog hands out the purchase.

use std::sync::Arc;
use tracing::{info, warn};

use crate::comments;
use crate::db::models::{
    AdditionalInfo, GatewayStatus, NewTransaction, RecordPatch, TransactionRecord,
};
use crate::error::AppError;
use crate::fulfillment::ProductCatalog;
use crate::gateway::types::{GatewayResponse, InstalmentInfo, ResultInfo, TransactionInfo};
use crate::gateway::NovalnetClient;
use crate::instalment::InstalmentPlan;
use crate::notify::{compose_onhold_email, compose_status_email, Notifier};
use crate::payment::PaymentType;
use crate::settings::GatewayConfig;
use crate::store::TransactionStore;

/// Collaborators the lifecycle logic acts through.
#[derive(Clone)]
pub struct PaymentContext {
    pub store: Arc<dyn TransactionStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub notifier: Arc<dyn Notifier>,
    pub client: NovalnetClient,
}

/// The purchase a processor transaction belongs to.
#[derive(Debug, Clone)]
pub struct PurchaseIntent {
    pub order_ref: String,
    pub user_id: i64,
    pub product_id: i64,
    pub customer_email: String,
}

impl PurchaseIntent {
    pub fn from_record(record: &TransactionRecord) -> Self {
        Self {
            order_ref: record.order_ref.clone(),
            user_id: record.user_id,
            product_id: record.product_id,
            customer_email: record.customer_email.clone(),
        }
    }
}

/// User-facing message for a failed payment, from the processor's status text
/// when it sent one.
pub fn failure_message(result: &ResultInfo) -> String {
    result
        .status_text
        .clone()
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| "The payment could not be processed. Please try again.".to_string())
}

/// Payment-reference data carried on the transaction, if any.
pub fn additional_info_from(
    txn: &TransactionInfo,
    instalment: Option<&InstalmentInfo>,
    tid: &str,
) -> Option<AdditionalInfo> {
    let payment_type = txn.payment_type.unwrap_or(PaymentType::Unknown);
    if payment_type.supports_instalment() {
        if let Some(instalment) = instalment {
            return Some(AdditionalInfo::Instalments(InstalmentPlan::from_gateway(
                instalment,
                tid,
                txn.amount.unwrap_or(0),
            )));
        }
    }
    if payment_type == PaymentType::Multibanco {
        if let Some(reference) = txn.partner_payment_reference.clone() {
            return Some(AdditionalInfo::Multibanco {
                partner_payment_reference: reference,
                service_supplier_id: txn.service_supplier_id.clone(),
            });
        }
    }
    if let Some(details) = &txn.bank_details {
        return Some(AdditionalInfo::Bank {
            details: details.clone(),
            due_date: txn.due_date.clone(),
            invoice_ref: txn.invoice_ref.clone(),
        });
    }
    if let Some(stores) = &txn.nearest_stores {
        if !stores.is_empty() {
            return Some(AdditionalInfo::Stores {
                due_date: txn.due_date.clone(),
                stores: stores.clone(),
            });
        }
    }
    None
}

/// Persists a confirmed/pending/on-hold/deactivated transaction and performs
/// the per-status side effects. Replays for an already-known tid return the
/// stored record unchanged.
pub async fn finalize_success(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    intent: &PurchaseIntent,
    response: &GatewayResponse,
) -> Result<TransactionRecord, AppError> {
    let txn = response
        .transaction
        .as_ref()
        .ok_or_else(|| AppError::Validation("transaction section missing".into()))?;
    let tid = txn
        .tid
        .clone()
        .ok_or_else(|| AppError::Validation("transaction id missing".into()))?;
    let status = txn
        .status
        .as_deref()
        .and_then(GatewayStatus::parse)
        .ok_or_else(|| AppError::Validation("unknown transaction status".into()))?;

    if let Some(existing) = ctx.store.find_by_tid(&tid).await? {
        return Ok(existing);
    }

    // Redirect umbrellas (e.g. online transfer) come back with the concrete
    // sub-method; taking the reported type replaces the placeholder.
    let payment_type = txn.payment_type.unwrap_or(PaymentType::Unknown);
    let amount = txn.amount.unwrap_or(0);
    let currency = txn.currency.clone().unwrap_or_else(|| "EUR".to_string());
    let test_mode = txn.test_mode == Some(1);
    let additional_info = additional_info_from(txn, response.instalment.as_ref(), &tid);

    let mut comment = comments::transaction_comment(payment_type, &tid, test_mode);
    if let Some(payment_data) = &txn.payment_data {
        if let Some(wallet) = comments::wallet_comment(payment_type, payment_data) {
            comment.push('\n');
            comment.push_str(&wallet);
        }
    }
    if let Some(info) = &additional_info {
        comment.push('\n');
        comment.push_str(&comments::reference_comment(info, &currency, amount));
    }
    if status == GatewayStatus::Pending && payment_type.supports_guarantee() {
        comment.push('\n');
        comment.push_str(comments::guarantee_pending_comment());
    }
    if status == GatewayStatus::Deactivated {
        comment.push('\n');
        comment.push_str(&comments::cancel_comment());
    }

    let paid_amount = if status == GatewayStatus::Confirmed {
        amount
    } else {
        0
    };

    let mut record = ctx
        .store
        .insert(NewTransaction {
            order_ref: intent.order_ref.clone(),
            user_id: intent.user_id,
            product_id: intent.product_id,
            customer_email: intent.customer_email.clone(),
            tid: tid.clone(),
            payment_type,
            gateway_status: status,
            amount,
            currency,
            paid_amount,
            test_mode,
            additional_info,
            comments: comment,
        })
        .await?;

    match status {
        GatewayStatus::Confirmed => {
            record = deliver_and_bind(ctx, config, record, txn.invoice_ref.as_deref()).await?;
            ctx.notifier
                .send(compose_status_email(
                    &record,
                    "Your payment was successful.",
                ))
                .await?;
        }
        GatewayStatus::OnHold => {
            if let Some(merchant_email) = &config.onhold_notify_email {
                ctx.notifier
                    .send(compose_onhold_email(&record, merchant_email))
                    .await?;
            }
        }
        _ => {}
    }

    info!(
        tid = %record.tid,
        status = record.gateway_status.as_str(),
        order_ref = %record.order_ref,
        "transaction finalized"
    );
    Ok(record)
}

/// Hands out the product and reports the resulting shop order number back to
/// the processor. A failing report call is logged but does not undo delivery.
pub async fn deliver_and_bind(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    record: TransactionRecord,
    invoice_ref: Option<&str>,
) -> Result<TransactionRecord, AppError> {
    if record.delivered {
        return Ok(record);
    }
    let order_id = ctx.catalog.deliver(record.user_id, record.product_id).await?;
    let order_no = order_id.to_string();

    if let Err(err) = ctx
        .client
        .bind_order(config, &record.tid, &order_no, invoice_ref)
        .await
    {
        warn!(tid = %record.tid, error = %err, "order number report to processor failed");
    }

    let patch = RecordPatch {
        order_no: Some(order_no.clone()),
        delivered: Some(true),
        append_comments: vec![format!("Product delivered, order number {order_no}")],
        ..Default::default()
    };
    Ok(ctx.store.update(record.id, patch).await?)
}

/// Persists a failed first contact for a purchase and returns the customer
/// message. Used when the failure arrives over a webhook; the synchronous
/// return flow only needs [`failure_message`].
pub async fn finalize_failure(
    ctx: &PaymentContext,
    intent: &PurchaseIntent,
    response: &GatewayResponse,
) -> Result<(TransactionRecord, String), AppError> {
    let txn = response
        .transaction
        .as_ref()
        .ok_or_else(|| AppError::Validation("transaction section missing".into()))?;
    let tid = txn
        .tid
        .clone()
        .ok_or_else(|| AppError::Validation("transaction id missing".into()))?;

    if let Some(existing) = ctx.store.find_by_tid(&tid).await? {
        let message = failure_message(&response.result);
        return Ok((existing, message));
    }

    let payment_type = txn.payment_type.unwrap_or(PaymentType::Unknown);
    let test_mode = txn.test_mode == Some(1);
    let message = failure_message(&response.result);
    let comment = format!(
        "{}\n{message}",
        comments::transaction_comment(payment_type, &tid, test_mode)
    );

    let record = ctx
        .store
        .insert(NewTransaction {
            order_ref: intent.order_ref.clone(),
            user_id: intent.user_id,
            product_id: intent.product_id,
            customer_email: intent.customer_email.clone(),
            tid,
            payment_type,
            gateway_status: GatewayStatus::Failure,
            amount: txn.amount.unwrap_or(0),
            currency: txn.currency.clone().unwrap_or_else(|| "EUR".to_string()),
            paid_amount: 0,
            test_mode,
            additional_info: None,
            comments: comment,
        })
        .await?;

    Ok((record, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_prefers_status_text() {
        let result = ResultInfo {
            status: "FAILURE".into(),
            status_code: None,
            status_text: Some("Card expired".into()),
        };
        assert_eq!(failure_message(&result), "Card expired");

        let blank = ResultInfo {
            status: "FAILURE".into(),
            status_code: None,
            status_text: Some("   ".into()),
        };
        assert!(failure_message(&blank).contains("could not be processed"));
    }

    #[test]
    fn additional_info_prefers_instalment_plan() {
        let txn: TransactionInfo = serde_json::from_value(serde_json::json!({
            "payment_type": "INSTALMENT_INVOICE",
            "amount": 1998,
            "bank_details": { "iban": "DE75512108001245126199" }
        }))
        .unwrap();
        let instalment: InstalmentInfo = serde_json::from_value(serde_json::json!({
            "cycle_amount": 999,
            "cycles_executed": 1,
            "pending_cycles": 1
        }))
        .unwrap();

        match additional_info_from(&txn, Some(&instalment), "100") {
            Some(AdditionalInfo::Instalments(plan)) => {
                assert_eq!(plan.total_cycles, 2);
                assert_eq!(plan.cycle_amount, 999);
            }
            other => panic!("expected instalment plan, got {other:?}"),
        }
    }

    #[test]
    fn additional_info_uses_bank_details_for_invoice() {
        let txn: TransactionInfo = serde_json::from_value(serde_json::json!({
            "payment_type": "INVOICE",
            "amount": 1500,
            "due_date": "2026-09-10",
            "bank_details": { "iban": "DE75512108001245126199" }
        }))
        .unwrap();

        match additional_info_from(&txn, None, "100") {
            Some(AdditionalInfo::Bank { due_date, .. }) => {
                assert_eq!(due_date.as_deref(), Some("2026-09-10"));
            }
            other => panic!("expected bank details, got {other:?}"),
        }
    }
}

//! Per-event webhook handlers.
//!
//! Handlers are idempotent: replays and out-of-order deliveries fall through
//! the state-transition guards and report what already happened instead of
//! mutating twice.

use tracing::info;

use crate::comments;
use crate::db::models::{GatewayStatus, RecordPatch, TransactionRecord};
use crate::error::AppError;
use crate::gateway::types::GatewayResponse;
use crate::instalment::CancelMode;
use crate::lifecycle::{self, PaymentContext, PurchaseIntent};
use crate::notify::{compose_onhold_email, compose_status_email};
use crate::payment::PaymentType;
use crate::settings::GatewayConfig;
use crate::webhook::correlate::{correlate, Correlation};
use crate::webhook::{WebhookPayload, WebhookReply, WebhookTransaction};

pub async fn handle_event(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    payload: &WebhookPayload,
) -> Result<WebhookReply, AppError> {
    let event_type = payload
        .event
        .as_ref()
        .and_then(|e| e.event_type.as_deref())
        .unwrap_or_default()
        .to_string();

    let correlation = correlate(ctx.store.as_ref(), payload).await?;
    if matches!(correlation, Correlation::Mismatch) {
        return Ok(WebhookReply::new(
            "Order reference in the payload does not match the transaction.",
        ));
    }

    // The checksum signs the reported status too, so a legitimately signed
    // failed attempt (e.g. a refund the processor could not execute) arrives
    // here. Only PAYMENT records failures; everything else acts on success.
    let success = payload
        .result
        .as_ref()
        .map(|result| result.is_success())
        .unwrap_or(false);
    if event_type != "PAYMENT" && !success {
        return Ok(WebhookReply::new(
            "Novalnet callback received. Status is not valid.",
        ));
    }

    match event_type.as_str() {
        "PAYMENT" => payment(ctx, config, payload, correlation).await,
        "TRANSACTION_CAPTURE" => {
            with_record(correlation, |record| capture(ctx, config, payload, record)).await
        }
        "TRANSACTION_CANCEL" => with_record(correlation, |record| cancel(ctx, record)).await,
        "TRANSACTION_REFUND" => {
            with_record(correlation, |record| refund(ctx, payload, record)).await
        }
        "TRANSACTION_UPDATE" => {
            with_record(correlation, |record| update(ctx, config, payload, record)).await
        }
        "CREDIT" => credit(ctx, config, payload, correlation).await,
        "INSTALMENT" => {
            with_record(correlation, |record| instalment_cycle(ctx, payload, record)).await
        }
        "INSTALMENT_CANCEL" => {
            with_record(correlation, |record| instalment_cancel(ctx, payload, record)).await
        }
        "CHARGEBACK" => with_record(correlation, |record| chargeback(ctx, payload, record)).await,
        "PAYMENT_REMINDER_1" => with_record(correlation, |record| reminder(ctx, 1, record)).await,
        "PAYMENT_REMINDER_2" => with_record(correlation, |record| reminder(ctx, 2, record)).await,
        "SUBMISSION_TO_COLLECTION_AGENCY" => {
            with_record(correlation, |record| collection(ctx, payload, record)).await
        }
        other => Ok(WebhookReply::new(format!(
            "The webhook notification has been received for the unhandled EVENT type({other})"
        ))),
    }
}

async fn with_record<F, Fut>(correlation: Correlation, handler: F) -> Result<WebhookReply, AppError>
where
    F: FnOnce(TransactionRecord) -> Fut,
    Fut: std::future::Future<Output = Result<WebhookReply, AppError>>,
{
    match correlation {
        Correlation::Found(record) => handler(record).await,
        _ => Ok(WebhookReply::new(
            "Order reference not found for the transaction.",
        )),
    }
}

fn transaction(payload: &WebhookPayload) -> Result<&WebhookTransaction, AppError> {
    payload
        .transaction
        .as_ref()
        .ok_or_else(|| AppError::Validation("transaction section missing".into()))
}

fn as_gateway_response(payload: &WebhookPayload) -> Result<GatewayResponse, AppError> {
    Ok(GatewayResponse {
        result: payload
            .result
            .clone()
            .ok_or_else(|| AppError::Validation("result section missing".into()))?,
        transaction: Some(transaction(payload)?.info.clone()),
        instalment: payload.instalment.clone(),
        custom: payload.custom.clone(),
        redirect_url: None,
    })
}

/// First confirmation for a purchase. Replays for a known transaction are
/// acknowledged without touching anything.
async fn payment(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    payload: &WebhookPayload,
    correlation: Correlation,
) -> Result<WebhookReply, AppError> {
    let order_ref = match correlation {
        Correlation::Found(_) => {
            return Ok(WebhookReply::new(
                "Novalnet Callback executed. The Transaction ID already existed.",
            ))
        }
        Correlation::Unmatched { order_ref } => order_ref,
        Correlation::Mismatch => unreachable!("mismatch handled by caller"),
    };

    let Some(order_ref) = order_ref else {
        return Ok(WebhookReply::new(
            "Order reference not found for the transaction.",
        ));
    };
    let Some(session) = ctx.store.find_session(&order_ref).await? else {
        return Ok(WebhookReply::new(
            "Order reference not found for the transaction.",
        ));
    };

    let intent = PurchaseIntent {
        order_ref: session.order_ref.clone(),
        user_id: session.user_id,
        product_id: session.product_id,
        customer_email: session.customer_email.clone(),
    };
    let response = as_gateway_response(payload)?;
    let status = transaction(payload)?.info.status.as_deref().unwrap_or("");

    let record = if response.result.is_success() && status != "FAILURE" {
        lifecycle::finalize_success(ctx, config, &intent, &response).await?
    } else {
        let (record, message) = lifecycle::finalize_failure(ctx, &intent, &response).await?;
        ctx.notifier
            .send(compose_status_email(&record, &message))
            .await?;
        record
    };
    ctx.store.delete_session(&order_ref).await?;

    Ok(WebhookReply::new(format!(
        "Novalnet Callback executed for the TID: {}",
        record.tid
    )))
}

async fn capture(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    payload: &WebhookPayload,
    record: TransactionRecord,
) -> Result<WebhookReply, AppError> {
    if !record
        .gateway_status
        .can_transition_to(GatewayStatus::Confirmed)
    {
        return Ok(WebhookReply::new(
            "Novalnet Callback executed. Order already processed.",
        ));
    }
    let txn = transaction(payload)?;
    let amount = txn.info.amount.unwrap_or(record.amount);
    let comment = comments::capture_comment();

    let patch = RecordPatch {
        gateway_status: Some(GatewayStatus::Confirmed),
        paid_amount: Some(amount),
        append_comments: vec![comment.clone()],
        ..Default::default()
    };
    let record = ctx.store.update(record.id, patch).await?;
    let record =
        lifecycle::deliver_and_bind(ctx, config, record, txn.info.invoice_ref.as_deref()).await?;
    ctx.notifier
        .send(compose_status_email(&record, "Your payment was successful."))
        .await?;

    Ok(WebhookReply::new(comment))
}

async fn cancel(ctx: &PaymentContext, record: TransactionRecord) -> Result<WebhookReply, AppError> {
    if !record
        .gateway_status
        .can_transition_to(GatewayStatus::Deactivated)
    {
        return Ok(WebhookReply::new(
            "Novalnet Callback executed. Order already processed.",
        ));
    }
    let comment = comments::cancel_comment();
    let record = ctx
        .store
        .update(
            record.id,
            RecordPatch::status(GatewayStatus::Deactivated).with_comment(comment.clone()),
        )
        .await?;
    ctx.notifier
        .send(compose_status_email(&record, &comment))
        .await?;
    Ok(WebhookReply::new(comment))
}

async fn refund(
    ctx: &PaymentContext,
    payload: &WebhookPayload,
    record: TransactionRecord,
) -> Result<WebhookReply, AppError> {
    let txn = transaction(payload)?;
    let refund_info = txn.info.refund.as_ref();
    let amount = refund_info
        .and_then(|r| r.amount)
        .or(txn.info.amount)
        .unwrap_or(0);
    if amount <= 0 {
        return Ok(WebhookReply::new(
            "Novalnet Callback executed. No refund amount in the payload.",
        ));
    }
    let refund_tid = refund_info
        .and_then(|r| r.tid.as_deref())
        .or_else(|| payload.event.as_ref().and_then(|e| e.tid.as_deref()))
        .unwrap_or(&record.tid)
        .to_string();

    // Refunded total only ever grows.
    let refunded = record.refunded_amount + amount;
    let comment = comments::refund_comment(&refund_tid, amount, &record.currency);

    let mut patch = RecordPatch {
        refunded_amount: Some(refunded),
        append_comments: vec![comment.clone()],
        ..Default::default()
    };

    if let Some(plan) = record.instalment_plan() {
        let mut plan = plan.clone();
        plan.apply_refund(&refund_tid, amount);
        patch.additional_info = Some(crate::db::models::AdditionalInfo::Instalments(plan));
    }

    let full_refund = refunded >= record.amount;
    if full_refund && record.delivered && !record.revoked {
        ctx.catalog.revoke(record.user_id, record.product_id).await?;
        patch.revoked = Some(true);
        info!(tid = %record.tid, "product access revoked after full refund");
    }

    ctx.store.update(record.id, patch).await?;
    Ok(WebhookReply::new(comment))
}

async fn update(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    payload: &WebhookPayload,
    record: TransactionRecord,
) -> Result<WebhookReply, AppError> {
    let txn = transaction(payload)?;
    let update_type = txn.update_type.as_deref().unwrap_or("");
    let amount = txn.info.amount.unwrap_or(record.amount);

    match update_type {
        "AMOUNT_DUE_DATE" | "DUE_DATE" => {
            let comment =
                comments::due_date_comment(amount, &record.currency, txn.info.due_date.as_deref());
            let mut patch = RecordPatch::comment(comment.clone());
            patch.amount = Some(amount);
            if let Some(crate::db::models::AdditionalInfo::Bank {
                details,
                invoice_ref,
                ..
            }) = record.additional_info.clone()
            {
                patch.additional_info = Some(crate::db::models::AdditionalInfo::Bank {
                    details,
                    due_date: txn.info.due_date.clone(),
                    invoice_ref,
                });
            }
            ctx.store.update(record.id, patch).await?;
            Ok(WebhookReply::new(comment))
        }
        "STATUS" => {
            let Some(new_status) = txn.info.status.as_deref().and_then(GatewayStatus::parse)
            else {
                return Ok(WebhookReply::new(
                    "Novalnet callback received. Status is not valid.",
                ));
            };
            status_update(ctx, config, payload, record, new_status).await
        }
        _ => {
            let comment = comments::due_date_comment(amount, &record.currency, None);
            let mut patch = RecordPatch::comment(comment.clone());
            patch.amount = Some(amount);
            ctx.store.update(record.id, patch).await?;
            Ok(WebhookReply::new(comment))
        }
    }
}

async fn status_update(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    payload: &WebhookPayload,
    record: TransactionRecord,
    new_status: GatewayStatus,
) -> Result<WebhookReply, AppError> {
    if !record.gateway_status.can_transition_to(new_status) {
        return Ok(WebhookReply::new(
            "Novalnet callback received. Status is not valid.",
        ));
    }
    match new_status {
        GatewayStatus::OnHold => {
            let comment = comments::on_hold_comment(&record.tid);
            let record = ctx
                .store
                .update(
                    record.id,
                    RecordPatch::status(GatewayStatus::OnHold).with_comment(comment.clone()),
                )
                .await?;
            if let Some(merchant_email) = &config.onhold_notify_email {
                ctx.notifier
                    .send(compose_onhold_email(&record, merchant_email))
                    .await?;
            }
            Ok(WebhookReply::new(comment))
        }
        GatewayStatus::Confirmed => capture(ctx, config, payload, record).await,
        GatewayStatus::Deactivated | GatewayStatus::Failure => {
            let comment = comments::cancel_comment();
            ctx.store
                .update(
                    record.id,
                    RecordPatch::status(new_status).with_comment(comment.clone()),
                )
                .await?;
            Ok(WebhookReply::new(comment))
        }
        GatewayStatus::Pending => Ok(WebhookReply::new(
            "Novalnet callback received. Status is not valid.",
        )),
    }
}

/// Incoming money. Pay-later credits accumulate towards the amount due;
/// chargeback-side entries are logged only.
async fn credit(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    payload: &WebhookPayload,
    correlation: Correlation,
) -> Result<WebhookReply, AppError> {
    let txn = transaction(payload)?;
    let credit_type = txn.info.payment_type.unwrap_or(PaymentType::Unknown);
    let credit_tid = payload
        .event
        .as_ref()
        .and_then(|e| e.tid.clone())
        .unwrap_or_default();

    let record = match correlation {
        Correlation::Found(record) => record,
        Correlation::Unmatched { order_ref } => {
            // A bank transfer can land before the redirect returned; fetch
            // the parent transaction and finalize it first.
            if credit_type != PaymentType::OnlineTransferCredit {
                return Ok(WebhookReply::new(
                    "Order reference not found for the transaction.",
                ));
            }
            match bootstrap_parent(ctx, config, payload, order_ref).await? {
                Some(record) => record,
                None => {
                    return Ok(WebhookReply::new(
                        "Order reference not found for the transaction.",
                    ))
                }
            }
        }
        Correlation::Mismatch => unreachable!("mismatch handled by caller"),
    };

    if credit_type.is_collection_credit() {
        let amount = txn.info.amount.unwrap_or(0);
        let comment = comments::credit_comment(&record, &credit_tid, amount);
        ctx.store
            .update(record.id, RecordPatch::comment(comment.clone()))
            .await?;
        return Ok(WebhookReply::new(comment));
    }

    if !credit_type.is_payable_credit() {
        return Ok(WebhookReply::new(
            "Novalnet webhook received. Order Already Paid",
        ));
    }

    if record.amount_due() == 0 && record.delivered {
        return Ok(WebhookReply::new(
            "Novalnet webhook received. Order Already Paid",
        ));
    }

    let amount = txn.info.amount.unwrap_or(0);
    let paid = record.paid_amount + amount;
    let due = record.amount - record.refunded_amount;
    let comment = comments::credit_comment(&record, &credit_tid, amount);

    let patch = RecordPatch {
        paid_amount: Some(paid),
        overpaid: Some(paid > due),
        append_comments: vec![comment.clone()],
        ..Default::default()
    };
    let record = ctx.store.update(record.id, patch).await?;

    if paid >= due {
        let record = lifecycle::deliver_and_bind(ctx, config, record, None).await?;
        ctx.notifier
            .send(compose_status_email(&record, "Your payment was received."))
            .await?;
    }

    Ok(WebhookReply::new(comment))
}

async fn bootstrap_parent(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    payload: &WebhookPayload,
    order_ref: Option<String>,
) -> Result<Option<TransactionRecord>, AppError> {
    let Some(parent_tid) = payload
        .event
        .as_ref()
        .and_then(|e| e.parent_tid.clone())
        .filter(|t| !t.is_empty())
    else {
        return Ok(None);
    };
    let Some(order_ref) = order_ref else {
        return Ok(None);
    };
    let Some(session) = ctx.store.find_session(&order_ref).await? else {
        return Ok(None);
    };

    let details = ctx.client.transaction_details(config, &parent_tid).await?;
    let intent = PurchaseIntent {
        order_ref: session.order_ref.clone(),
        user_id: session.user_id,
        product_id: session.product_id,
        customer_email: session.customer_email.clone(),
    };
    let record = lifecycle::finalize_success(ctx, config, &intent, &details).await?;
    ctx.store.delete_session(&order_ref).await?;
    Ok(Some(record))
}

async fn instalment_cycle(
    ctx: &PaymentContext,
    payload: &WebhookPayload,
    record: TransactionRecord,
) -> Result<WebhookReply, AppError> {
    let txn = transaction(payload)?;
    if record.gateway_status != GatewayStatus::Confirmed
        || txn.info.status.as_deref() != Some("CONFIRMED")
    {
        return Ok(WebhookReply::new(
            "Novalnet callback received. Status is not valid.",
        ));
    }
    let Some(instalment) = payload.instalment.as_ref() else {
        return Ok(WebhookReply::new(
            "A necessary parameter is missing from the request.",
        ));
    };
    let Some(plan) = record.instalment_plan() else {
        return Ok(WebhookReply::new(
            "Novalnet callback received. No instalment schedule on the order.",
        ));
    };

    let cycle_tid = payload
        .event
        .as_ref()
        .and_then(|e| e.tid.clone())
        .unwrap_or_default();
    let mut plan = plan.clone();
    let Some(cycle) = plan.record_cycle(instalment, &cycle_tid) else {
        return Ok(WebhookReply::new(
            "Novalnet Callback executed. Instalment cycle already recorded.",
        ));
    };

    let amount = instalment.cycle_amount.unwrap_or(plan.cycle_amount);
    let comment = comments::instalment_cycle_comment(&cycle_tid, amount, &record.currency);
    let patch = RecordPatch {
        additional_info: Some(crate::db::models::AdditionalInfo::Instalments(plan)),
        append_comments: vec![comment.clone()],
        ..Default::default()
    };
    let record = ctx.store.update(record.id, patch).await?;
    ctx.notifier
        .send(compose_status_email(&record, &comment))
        .await?;

    info!(tid = %record.tid, cycle, "instalment cycle recorded");
    Ok(WebhookReply::new(comment))
}

async fn instalment_cancel(
    ctx: &PaymentContext,
    payload: &WebhookPayload,
    record: TransactionRecord,
) -> Result<WebhookReply, AppError> {
    if record.gateway_status != GatewayStatus::Confirmed {
        return Ok(WebhookReply::new(
            "Novalnet callback received. Status is not valid.",
        ));
    }
    let Some(plan) = record.instalment_plan() else {
        return Ok(WebhookReply::new(
            "Novalnet callback received. No instalment schedule on the order.",
        ));
    };

    let mode = payload
        .instalment
        .as_ref()
        .and_then(|i| i.cancel_type.as_deref())
        .and_then(CancelMode::parse)
        .unwrap_or(CancelMode::AllCycles);

    let mut plan = plan.clone();
    let refundable = plan.cancel(mode);

    let mut comment = match mode {
        CancelMode::RemainingCycles => format!(
            "Instalment has been stopped for the TID: {}",
            record.tid
        ),
        CancelMode::AllCycles => format!(
            "Instalment has been cancelled for the TID: {}",
            record.tid
        ),
    };
    if refundable > 0 {
        comment.push_str(&format!(
            " & Refund has been initiated with the amount {}",
            comments::format_amount(refundable, &record.currency)
        ));
    }

    let mut patch = RecordPatch {
        gateway_status: Some(GatewayStatus::Deactivated),
        additional_info: Some(crate::db::models::AdditionalInfo::Instalments(plan)),
        append_comments: vec![comment.clone()],
        ..Default::default()
    };
    if refundable > 0 {
        patch.refunded_amount = Some(record.refunded_amount + refundable);
    }
    if record.delivered && !record.revoked {
        ctx.catalog.revoke(record.user_id, record.product_id).await?;
        patch.revoked = Some(true);
    }

    ctx.store.update(record.id, patch).await?;
    Ok(WebhookReply::new(comment))
}

async fn chargeback(
    ctx: &PaymentContext,
    payload: &WebhookPayload,
    record: TransactionRecord,
) -> Result<WebhookReply, AppError> {
    if record.gateway_status != GatewayStatus::Confirmed {
        return Ok(WebhookReply::new(
            "Novalnet callback received. Status is not valid.",
        ));
    }
    let txn = transaction(payload)?;
    let chargeback_tid = payload
        .event
        .as_ref()
        .and_then(|e| e.tid.clone())
        .unwrap_or_default();
    let comment = comments::chargeback_comment(
        &chargeback_tid,
        txn.info.amount.unwrap_or(0),
        &record.currency,
    );
    ctx.store
        .update(record.id, RecordPatch::comment(comment.clone()))
        .await?;
    Ok(WebhookReply::new(comment))
}

async fn reminder(
    ctx: &PaymentContext,
    level: u8,
    record: TransactionRecord,
) -> Result<WebhookReply, AppError> {
    let comment = comments::reminder_comment(level);
    let record = ctx
        .store
        .update(record.id, RecordPatch::comment(comment.clone()))
        .await?;
    ctx.notifier
        .send(compose_status_email(&record, &comment))
        .await?;
    Ok(WebhookReply::new(comment))
}

async fn collection(
    ctx: &PaymentContext,
    payload: &WebhookPayload,
    record: TransactionRecord,
) -> Result<WebhookReply, AppError> {
    let reference = payload
        .collection
        .as_ref()
        .and_then(|c| c.reference.as_deref())
        .unwrap_or("");
    let comment = comments::collection_comment(reference);
    let record = ctx
        .store
        .update(record.id, RecordPatch::comment(comment.clone()))
        .await?;
    ctx.notifier
        .send(compose_status_email(&record, &comment))
        .await?;
    Ok(WebhookReply::new(comment))
}

//! Customer-facing comment blocks describing a transaction.
//!
//! Comments accumulate on the record over the lifetime of a payment and show
//! up in order notes and notification mails.

use chrono::Utc;

use crate::db::models::{AdditionalInfo, TransactionRecord};
use crate::gateway::types::{BankDetails, NearestStore};
use crate::payment::PaymentType;

/// Formats minor units as a decimal amount with currency, e.g. `15.00 EUR`.
pub fn format_amount(minor_units: i64, currency: &str) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Initial comment block: payment name, transaction id and test-mode marker.
pub fn transaction_comment(payment_type: PaymentType, tid: &str, test_mode: bool) -> String {
    let mut comment = format!(
        "{}\nNovalnet transaction ID: {tid}",
        payment_type.label()
    );
    if test_mode {
        comment.push_str("\nTest order");
    }
    comment
}

fn bank_comment(details: &BankDetails, due_date: Option<&str>, amount: &str) -> String {
    let mut lines = vec![match due_date {
        Some(date) => format!(
            "Please transfer the amount of {amount} to the following account on or before {date}"
        ),
        None => format!("Please transfer the amount of {amount} to the following account"),
    }];
    if let Some(holder) = &details.account_holder {
        lines.push(format!("Account holder: {holder}"));
    }
    if let Some(bank) = &details.bank_name {
        let place = details.bank_place.as_deref().unwrap_or("");
        lines.push(format!("Bank: {bank} {place}").trim_end().to_string());
    }
    if let Some(iban) = &details.iban {
        lines.push(format!("IBAN: {iban}"));
    }
    if let Some(bic) = &details.bic {
        lines.push(format!("BIC: {bic}"));
    }
    lines.join("\n")
}

fn stores_comment(stores: &[NearestStore], due_date: Option<&str>) -> String {
    let mut lines = Vec::new();
    if let Some(date) = due_date {
        lines.push(format!("Slip expiry date: {date}"));
    }
    if !stores.is_empty() {
        lines.push("Store(s) near you:".to_string());
        for store in stores {
            let parts: Vec<&str> = [
                store.store_name.as_deref(),
                store.street.as_deref(),
                store.zip.as_deref(),
                store.city.as_deref(),
                store.country_code.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect();
            lines.push(parts.join(", "));
        }
    }
    lines.join("\n")
}

/// Payment-reference instructions appended after the transaction comment:
/// bank-transfer details, store listings or the instalment schedule.
pub fn reference_comment(info: &AdditionalInfo, currency: &str, amount_due: i64) -> String {
    match info {
        AdditionalInfo::Bank {
            details,
            due_date,
            invoice_ref,
        } => {
            let mut comment = bank_comment(
                details,
                due_date.as_deref(),
                &format_amount(amount_due, currency),
            );
            if let Some(invoice_ref) = invoice_ref {
                comment.push_str(&format!("\nPayment reference: {invoice_ref}"));
            }
            comment
        }
        AdditionalInfo::Multibanco {
            partner_payment_reference,
            service_supplier_id,
        } => {
            let mut comment = format!(
                "Please use the following payment reference details to pay the amount of {} \
                 at a Multibanco ATM or through your internet banking.\n\
                 Payment reference: {partner_payment_reference}",
                format_amount(amount_due, currency)
            );
            if let Some(supplier) = service_supplier_id {
                comment.push_str(&format!("\nEntity: {supplier}"));
            }
            comment
        }
        AdditionalInfo::Stores { due_date, stores } => stores_comment(stores, due_date.as_deref()),
        AdditionalInfo::Instalments(plan) => format!(
            "Instalment payment: {} cycles of {}",
            plan.total_cycles,
            format_amount(plan.cycle_amount, currency)
        ),
    }
}

/// Card note on wallet payments, from the gateway's `payment_data` block.
pub fn wallet_comment(
    payment_type: PaymentType,
    payment_data: &serde_json::Value,
) -> Option<String> {
    if !matches!(payment_type, PaymentType::Googlepay | PaymentType::Applepay) {
        return None;
    }
    let brand = payment_data.get("card_brand").and_then(|v| v.as_str())?;
    let last_four = match payment_data.get("last_four") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    Some(format!(
        "Your order was successfully processed using {} ({brand} ****{last_four})",
        payment_type.label()
    ))
}

/// Shown while a guaranteed payment is still being verified.
pub fn guarantee_pending_comment() -> &'static str {
    "Your order is under verification and we will soon update you with the order status. \
     Please note that this may take a couple of days."
}

pub fn credit_comment(record: &TransactionRecord, credit_tid: &str, amount: i64) -> String {
    format!(
        "Credit has been successfully received for the TID: {} with amount {} on {}. \
         Please refer PAID order details in our Novalnet Admin Portal for the TID: {credit_tid}",
        record.tid,
        format_amount(amount, &record.currency),
        timestamp()
    )
}

pub fn refund_comment(refund_tid: &str, amount: i64, currency: &str) -> String {
    format!(
        "Refund has been initiated for the TID: {refund_tid} with the amount {}",
        format_amount(amount, currency)
    )
}

pub fn capture_comment() -> String {
    format!("The transaction has been confirmed on {}", timestamp())
}

pub fn cancel_comment() -> String {
    format!(
        "The transaction has been cancelled on {}",
        timestamp()
    )
}

pub fn on_hold_comment(tid: &str) -> String {
    format!(
        "The transaction status with TID {tid} has been set on hold on {}",
        timestamp()
    )
}

pub fn chargeback_comment(chargeback_tid: &str, amount: i64, currency: &str) -> String {
    format!(
        "Chargeback executed successfully for the TID: {chargeback_tid} amount: {} on {}",
        format_amount(amount, currency),
        timestamp()
    )
}

pub fn instalment_cycle_comment(cycle_tid: &str, amount: i64, currency: &str) -> String {
    format!(
        "A new instalment has been received for the Transaction ID: {cycle_tid} with amount {} \
         on {}",
        format_amount(amount, currency),
        timestamp()
    )
}

pub fn reminder_comment(level: u8) -> String {
    format!("Payment Reminder {level} has been sent to the customer.")
}

pub fn collection_comment(reference: &str) -> String {
    format!(
        "The transaction has been submitted to the collection agency. \
         Collection Reference: {reference}"
    )
}

pub fn due_date_comment(amount: i64, currency: &str, due_date: Option<&str>) -> String {
    match due_date {
        Some(date) => format!(
            "Transaction updated successfully with amount {} and due date {date}",
            format_amount(amount, currency)
        ),
        None => format!(
            "Transaction updated successfully with amount {}",
            format_amount(amount, currency)
        ),
    }
}

//! Matching a webhook event to the local transaction record.

use crate::db::models::TransactionRecord;
use crate::error::AppError;
use crate::store::TransactionStore;
use crate::webhook::WebhookPayload;

#[derive(Debug)]
pub enum Correlation {
    Found(TransactionRecord),
    /// No record yet. First-contact events can still proceed through the
    /// purchase session behind `order_ref`.
    Unmatched { order_ref: Option<String> },
    /// The payload's purchase reference disagrees with the record the
    /// transaction id points at. Processing must stop.
    Mismatch,
}

/// Locates the record for an event: by parent tid, then by the event tid,
/// then by the purchase reference from the custom metadata.
pub async fn correlate(
    store: &dyn TransactionStore,
    payload: &WebhookPayload,
) -> Result<Correlation, AppError> {
    let meta_ref = payload
        .custom
        .as_ref()
        .and_then(|custom| custom.order_ref())
        .map(str::to_string);

    let event = payload.event.as_ref();
    let parent_tid = event.and_then(|e| e.parent_tid.as_deref()).filter(|t| !t.is_empty());
    let event_tid = event.and_then(|e| e.tid.as_deref());

    let mut record = None;
    if let Some(parent_tid) = parent_tid {
        record = store.find_by_tid(parent_tid).await?;
    }
    if record.is_none() {
        if let Some(tid) = event_tid {
            record = store.find_by_tid(tid).await?;
        }
    }

    if let Some(record) = record {
        if let Some(meta_ref) = &meta_ref {
            if *meta_ref != record.order_ref {
                return Ok(Correlation::Mismatch);
            }
        }
        return Ok(Correlation::Found(record));
    }

    if let Some(meta_ref) = &meta_ref {
        if let Some(record) = store.find_by_order_ref(meta_ref).await? {
            return Ok(Correlation::Found(record));
        }
    }

    Ok(Correlation::Unmatched {
        order_ref: meta_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{GatewayStatus, NewTransaction};
    use crate::payment::PaymentType;
    use crate::store::memory::MemoryTransactionStore;

    fn payload(parent_tid: Option<&str>, tid: &str, order_ref: Option<&str>) -> WebhookPayload {
        let mut value = serde_json::json!({
            "event": { "tid": tid, "type": "CREDIT", "checksum": "x" },
        });
        if let Some(parent) = parent_tid {
            value["event"]["parent_tid"] = serde_json::json!(parent);
        }
        if let Some(order_ref) = order_ref {
            value["custom"] = serde_json::json!({
                "input1": "order_meta",
                "inputval1": order_ref
            });
        }
        serde_json::from_value(value).unwrap()
    }

    async fn seed(store: &MemoryTransactionStore, order_ref: &str, tid: &str) {
        store
            .insert(NewTransaction {
                order_ref: order_ref.into(),
                user_id: 7,
                product_id: 3,
                customer_email: "jo@example.org".into(),
                tid: tid.into(),
                payment_type: PaymentType::Invoice,
                gateway_status: GatewayStatus::Pending,
                amount: 1500,
                currency: "EUR".into(),
                paid_amount: 0,
                test_mode: true,
                additional_info: None,
                comments: String::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn parent_tid_wins_over_event_tid() {
        let store = MemoryTransactionStore::new();
        seed(&store, "ord-1", "14500000000012345").await;

        let result = correlate(
            &store,
            &payload(Some("14500000000012345"), "14500000000099999", None),
        )
        .await
        .unwrap();

        match result {
            Correlation::Found(record) => assert_eq!(record.order_ref, "ord-1"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_order_reference() {
        let store = MemoryTransactionStore::new();
        seed(&store, "ord-1", "14500000000012345").await;

        let result = correlate(
            &store,
            &payload(None, "14500000000099999", Some("ord-1")),
        )
        .await
        .unwrap();
        assert!(matches!(result, Correlation::Found(_)));
    }

    #[tokio::test]
    async fn conflicting_reference_aborts() {
        let store = MemoryTransactionStore::new();
        seed(&store, "ord-1", "14500000000012345").await;

        let result = correlate(
            &store,
            &payload(None, "14500000000012345", Some("ord-2")),
        )
        .await
        .unwrap();
        assert!(matches!(result, Correlation::Mismatch));
    }

    #[tokio::test]
    async fn unknown_transaction_reports_reference() {
        let store = MemoryTransactionStore::new();
        let result = correlate(
            &store,
            &payload(None, "14500000000012345", Some("ord-9")),
        )
        .await
        .unwrap();
        match result {
            Correlation::Unmatched { order_ref } => {
                assert_eq!(order_ref.as_deref(), Some("ord-9"));
            }
            other => panic!("expected unmatched, got {other:?}"),
        }
    }
}

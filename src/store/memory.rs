//! In-memory [`TransactionStore`] for tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::db::models::{NewTransaction, PurchaseSession, RecordPatch, TransactionRecord};
use crate::store::postgres::apply_patch;
use crate::store::{StoreError, StoreResult, TransactionStore};

#[derive(Default)]
pub struct MemoryTransactionStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<i64, TransactionRecord>,
    sessions: HashMap<String, PurchaseSession>,
    next_id: i64,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn insert(&self, record: NewTransaction) -> StoreResult<TransactionRecord> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let now = Utc::now();
        let stored = TransactionRecord {
            id: inner.next_id,
            order_ref: record.order_ref,
            user_id: record.user_id,
            product_id: record.product_id,
            customer_email: record.customer_email,
            tid: record.tid,
            payment_type: record.payment_type,
            gateway_status: record.gateway_status,
            amount: record.amount,
            currency: record.currency,
            paid_amount: record.paid_amount,
            refunded_amount: 0,
            test_mode: record.test_mode,
            order_no: None,
            additional_info: record.additional_info,
            overpaid: false,
            delivered: false,
            revoked: false,
            comments: record.comments,
            created_at: now,
            updated_at: now,
        };
        inner.records.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_tid(&self, tid: &str) -> StoreResult<Option<TransactionRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.values().find(|r| r.tid == tid).cloned())
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> StoreResult<Option<TransactionRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .values()
            .filter(|r| r.order_ref == order_ref)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn get(&self, id: i64) -> StoreResult<TransactionRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, id: i64, patch: RecordPatch) -> StoreResult<TransactionRecord> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply_patch(record, patch);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn put_session(&self, session: PurchaseSession) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(session.order_ref.clone(), session);
        Ok(())
    }

    async fn find_session(&self, order_ref: &str) -> StoreResult<Option<PurchaseSession>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.get(order_ref).cloned())
    }

    async fn delete_session(&self, order_ref: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.remove(order_ref);
        Ok(())
    }
}

//! Postgres implementation of [`TransactionStore`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::db::models::{
    AdditionalInfo, GatewayStatus, NewTransaction, PurchaseSession, RecordPatch, TransactionRecord,
};
use crate::payment::PaymentType;
use crate::store::{StoreError, StoreResult, TransactionStore};

#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RECORD_COLUMNS: &str = "id, order_ref, user_id, product_id, customer_email, tid, \
     payment_type, gateway_status, amount, currency, paid_amount, refunded_amount, \
     test_mode, order_no, additional_info, overpaid, delivered, revoked, comments, \
     created_at, updated_at";

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert(&self, record: NewTransaction) -> StoreResult<TransactionRecord> {
        let additional_info = record
            .additional_info
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let now = Utc::now();

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO nn_transactions (
                order_ref, user_id, product_id, customer_email, tid,
                payment_type, gateway_status, amount, currency, paid_amount,
                refunded_amount, test_mode, order_no, additional_info, overpaid,
                delivered, revoked, comments, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                      0, $11, NULL, $12, false, false, false, $13, $14, $14)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(&record.order_ref)
        .bind(record.user_id)
        .bind(record.product_id)
        .bind(&record.customer_email)
        .bind(&record.tid)
        .bind(record.payment_type.code())
        .bind(record.gateway_status.as_str())
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.paid_amount)
        .bind(record.test_mode)
        .bind(additional_info)
        .bind(&record.comments)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn find_by_tid(&self, tid: &str) -> StoreResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM nn_transactions WHERE tid = $1"
        ))
        .bind(tid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> StoreResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM nn_transactions WHERE order_ref = $1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get(&self, id: i64) -> StoreResult<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM nn_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn update(&self, id: i64, patch: RecordPatch) -> StoreResult<TransactionRecord> {
        // Row lock for the whole read-merge-write; concurrent webhook
        // deliveries for one record serialize here.
        let mut txn = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM nn_transactions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *txn)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut record = row.into_domain()?;
        apply_patch(&mut record, patch);

        let additional_info = record
            .additional_info
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        record.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE nn_transactions SET
                tid = $2, payment_type = $3, gateway_status = $4, amount = $5,
                paid_amount = $6, refunded_amount = $7, order_no = $8,
                additional_info = $9, overpaid = $10, delivered = $11,
                revoked = $12, comments = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.tid)
        .bind(record.payment_type.code())
        .bind(record.gateway_status.as_str())
        .bind(record.amount)
        .bind(record.paid_amount)
        .bind(record.refunded_amount)
        .bind(&record.order_no)
        .bind(additional_info)
        .bind(record.overpaid)
        .bind(record.delivered)
        .bind(record.revoked)
        .bind(&record.comments)
        .bind(record.updated_at)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(record)
    }

    async fn put_session(&self, session: PurchaseSession) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO nn_purchase_sessions (
                order_ref, user_id, product_id, customer_email, payment_type,
                amount, currency, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_ref) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                product_id = EXCLUDED.product_id,
                customer_email = EXCLUDED.customer_email,
                payment_type = EXCLUDED.payment_type,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&session.order_ref)
        .bind(session.user_id)
        .bind(session.product_id)
        .bind(&session.customer_email)
        .bind(session.payment_type.code())
        .bind(session.amount)
        .bind(&session.currency)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, order_ref: &str) -> StoreResult<Option<PurchaseSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT order_ref, user_id, product_id, customer_email, payment_type, \
             amount, currency, created_at FROM nn_purchase_sessions WHERE order_ref = $1",
        )
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRow::into_domain))
    }

    async fn delete_session(&self, order_ref: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM nn_purchase_sessions WHERE order_ref = $1")
            .bind(order_ref)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    order_ref: String,
    user_id: i64,
    product_id: i64,
    customer_email: String,
    payment_type: String,
    amount: i64,
    currency: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl SessionRow {
    fn into_domain(self) -> PurchaseSession {
        PurchaseSession {
            order_ref: self.order_ref,
            user_id: self.user_id,
            product_id: self.product_id,
            customer_email: self.customer_email,
            payment_type: PaymentType::from_code(&self.payment_type)
                .unwrap_or(PaymentType::Unknown),
            amount: self.amount,
            currency: self.currency,
            created_at: self.created_at,
        }
    }
}

pub(crate) fn apply_patch(record: &mut TransactionRecord, patch: RecordPatch) {
    if let Some(tid) = patch.tid {
        record.tid = tid;
    }
    if let Some(payment_type) = patch.payment_type {
        record.payment_type = payment_type;
    }
    if let Some(status) = patch.gateway_status {
        record.gateway_status = status;
    }
    if let Some(amount) = patch.amount {
        record.amount = amount;
    }
    if let Some(paid) = patch.paid_amount {
        record.paid_amount = paid;
    }
    if let Some(refunded) = patch.refunded_amount {
        record.refunded_amount = refunded;
    }
    if let Some(order_no) = patch.order_no {
        record.order_no = Some(order_no);
    }
    if let Some(info) = patch.additional_info {
        record.additional_info = Some(info);
    }
    if let Some(overpaid) = patch.overpaid {
        record.overpaid = overpaid;
    }
    if let Some(delivered) = patch.delivered {
        record.delivered = delivered;
    }
    if let Some(revoked) = patch.revoked {
        record.revoked = revoked;
    }
    for comment in patch.append_comments {
        if !record.comments.is_empty() {
            record.comments.push('\n');
        }
        record.comments.push_str(&comment);
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    order_ref: String,
    user_id: i64,
    product_id: i64,
    customer_email: String,
    tid: String,
    payment_type: String,
    gateway_status: String,
    amount: i64,
    currency: String,
    paid_amount: i64,
    refunded_amount: i64,
    test_mode: bool,
    order_no: Option<String>,
    additional_info: Option<serde_json::Value>,
    overpaid: bool,
    delivered: bool,
    revoked: bool,
    comments: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<TransactionRecord> {
        let payment_type =
            PaymentType::from_code(&self.payment_type).unwrap_or(PaymentType::Unknown);
        let gateway_status: GatewayStatus =
            serde_json::from_value(serde_json::Value::String(self.gateway_status))?;
        let additional_info = self
            .additional_info
            .map(serde_json::from_value::<AdditionalInfo>)
            .transpose()?;

        Ok(TransactionRecord {
            id: self.id,
            order_ref: self.order_ref,
            user_id: self.user_id,
            product_id: self.product_id,
            customer_email: self.customer_email,
            tid: self.tid,
            payment_type,
            gateway_status,
            amount: self.amount,
            currency: self.currency,
            paid_amount: self.paid_amount,
            refunded_amount: self.refunded_amount,
            test_mode: self.test_mode,
            order_no: self.order_no,
            additional_info,
            overpaid: self.overpaid,
            delivered: self.delivered,
            revoked: self.revoked,
            comments: self.comments,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

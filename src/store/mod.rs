//! Storage port for transaction records.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{NewTransaction, PurchaseSession, RecordPatch, TransactionRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence behind the lifecycle logic. Patches must apply atomically; two
/// concurrent webhook deliveries for the same record may not interleave their
/// read-modify-write.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, record: NewTransaction) -> StoreResult<TransactionRecord>;

    async fn find_by_tid(&self, tid: &str) -> StoreResult<Option<TransactionRecord>>;

    /// Looks a record up by the shop-side purchase reference.
    async fn find_by_order_ref(&self, order_ref: &str) -> StoreResult<Option<TransactionRecord>>;

    async fn get(&self, id: i64) -> StoreResult<TransactionRecord>;

    async fn update(&self, id: i64, patch: RecordPatch) -> StoreResult<TransactionRecord>;

    /// Saves the correlation data for a purchase that was just sent to the
    /// hosted page. Replaces an earlier session for the same reference.
    async fn put_session(&self, session: PurchaseSession) -> StoreResult<()>;

    async fn find_session(&self, order_ref: &str) -> StoreResult<Option<PurchaseSession>>;

    async fn delete_session(&self, order_ref: &str) -> StoreResult<()>;
}

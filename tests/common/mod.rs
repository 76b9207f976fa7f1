//! Shared fixtures for the integration tests.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use novalnet_gateway::db::models::PurchaseSession;
use novalnet_gateway::error::AppError;
use novalnet_gateway::fulfillment::ProductCatalog;
use novalnet_gateway::gateway::NovalnetClient;
use novalnet_gateway::lifecycle::PaymentContext;
use novalnet_gateway::notify::{Notification, Notifier};
use novalnet_gateway::payment::PaymentType;
use novalnet_gateway::settings::GatewayConfig;
use novalnet_gateway::store::memory::MemoryTransactionStore;
use novalnet_gateway::store::TransactionStore;

pub const ACCESS_KEY: &str = "a87ff679a2f3e71d9181a67b7542122c";

/// Catalog stub counting deliveries and revocations.
#[derive(Default)]
pub struct StubCatalog {
    next_order: AtomicI64,
    pub delivered: Mutex<Vec<(i64, i64)>>,
    pub revoked: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl ProductCatalog for StubCatalog {
    async fn deliver(&self, user_id: i64, product_id: i64) -> Result<i64, AppError> {
        self.delivered.lock().unwrap().push((user_id, product_id));
        Ok(self.next_order.fetch_add(1, Ordering::SeqCst) + 100)
    }

    async fn revoke(&self, user_id: i64, product_id: i64) -> Result<(), AppError> {
        self.revoked.lock().unwrap().push((user_id, product_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct StubNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for StubNotifier {
    async fn send(&self, notification: Notification) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

pub struct TestHarness {
    pub ctx: PaymentContext,
    pub store: Arc<MemoryTransactionStore>,
    pub catalog: Arc<StubCatalog>,
    pub notifier: Arc<StubNotifier>,
}

/// Builds a context whose processor client points at `gateway_url`.
pub fn harness(gateway_url: &str) -> TestHarness {
    let store = Arc::new(MemoryTransactionStore::new());
    let catalog = Arc::new(StubCatalog::default());
    let notifier = Arc::new(StubNotifier::default());
    let ctx = PaymentContext {
        store: store.clone(),
        catalog: catalog.clone(),
        notifier: notifier.clone(),
        client: NovalnetClient::new(gateway_url.to_string()),
    };
    TestHarness {
        ctx,
        store,
        catalog,
        notifier,
    }
}

pub fn config() -> Arc<GatewayConfig> {
    Arc::new(
        serde_json::from_value(serde_json::json!({
            "signature": "7ibc7ob5|tuJEH3gNbeWJfIHah||nbobljbnmdli0poys",
            "access_key": ACCESS_KEY,
            "tariff": "10004",
            "webhook_test_mode": true,
            "onhold_notify_email": "merchant@example.org",
            "methods": {
                "INVOICE": { "enabled": true, "due_date": 14 },
                "CREDITCARD": { "enabled": true },
                "INSTALMENT_INVOICE": { "enabled": true, "instalment_cycles": [2, 3] }
            }
        }))
        .unwrap(),
    )
}

pub async fn seed_session(store: &dyn TransactionStore, order_ref: &str) {
    store
        .put_session(PurchaseSession {
            order_ref: order_ref.to_string(),
            user_id: 7,
            product_id: 3,
            customer_email: "jo@example.org".to_string(),
            payment_type: PaymentType::Invoice,
            amount: 1500,
            currency: "EUR".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
}

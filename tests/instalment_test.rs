//! Instalment schedule lifecycle through the webhook pipeline.

mod common;

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::{json, Value};

use common::{config, harness, seed_session, TestHarness, ACCESS_KEY};
use novalnet_gateway::checksum;
use novalnet_gateway::db::models::{AdditionalInfo, GatewayStatus};
use novalnet_gateway::settings::StaticResolver;
use novalnet_gateway::store::TransactionStore;
use novalnet_gateway::webhook::WebhookProcessor;

const TID: &str = "14500000000012345";
const CYCLE_TID: &str = "14500000000099999";

fn processor(h: &TestHarness) -> WebhookProcessor {
    WebhookProcessor {
        ctx: h.ctx.clone(),
        resolver: Arc::new(StaticResolver::new((*config()).clone())),
        allowed_host: "localhost".to_string(),
    }
}

fn ip() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn signed(mut body: Value) -> Vec<u8> {
    let checksum = checksum::webhook_checksum(
        body["event"]["tid"].as_str().unwrap(),
        body["event"]["type"].as_str().unwrap(),
        body["result"]["status"].as_str().unwrap(),
        body["transaction"]["amount"].as_i64(),
        body["transaction"]["currency"].as_str().map(str::to_string).as_deref(),
        ACCESS_KEY,
    );
    body["event"]["checksum"] = json!(checksum);
    serde_json::to_vec(&body).unwrap()
}

async fn confirmed_instalment(h: &TestHarness, server: &mut mockito::ServerGuard) {
    let _bind = server
        .mock("POST", "/transaction/update")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{ "result": { "status": "SUCCESS" } }"#)
        .create_async()
        .await;
    seed_session(h.store.as_ref(), "ord-1").await;

    let payment = signed(json!({
        "event": { "tid": TID, "type": "PAYMENT" },
        "merchant": { "vendor": 4, "project": 14 },
        "result": { "status": "SUCCESS" },
        "custom": { "input1": "order_meta", "inputval1": "ord-1" },
        "transaction": {
            "tid": TID,
            "payment_type": "INSTALMENT_INVOICE",
            "status": "CONFIRMED",
            "amount": 1998,
            "currency": "EUR"
        },
        "instalment": {
            "cycle_amount": 999,
            "cycles_executed": 1,
            "pending_cycles": 1,
            "next_cycle_date": "2026-09-27"
        }
    }));
    processor(h).process(ip(), &payment).await;
}

#[tokio::test]
async fn schedule_is_stored_and_cycles_append() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(&server.url());
    confirmed_instalment(&h, &mut server).await;

    let record = h.store.find_by_tid(TID).await.unwrap().unwrap();
    assert_eq!(record.gateway_status, GatewayStatus::Confirmed);
    let plan = record.instalment_plan().expect("schedule stored");
    assert_eq!(plan.total_cycles, 2);
    assert_eq!(plan.cycles_executed, 1);

    let cycle = signed(json!({
        "event": { "tid": CYCLE_TID, "type": "INSTALMENT", "parent_tid": TID },
        "merchant": { "vendor": 4, "project": 14 },
        "result": { "status": "SUCCESS" },
        "transaction": {
            "tid": CYCLE_TID,
            "payment_type": "INSTALMENT_INVOICE",
            "status": "CONFIRMED",
            "amount": 999,
            "currency": "EUR"
        },
        "instalment": { "cycles_executed": 2, "cycle_amount": 999 }
    }));
    let reply = processor(&h).process(ip(), &cycle).await;
    assert!(reply.message.contains("new instalment"));

    let record = h.store.find_by_tid(TID).await.unwrap().unwrap();
    let plan = record.instalment_plan().unwrap();
    assert_eq!(plan.cycles_executed, 2);
    assert_eq!(plan.cycles[1].tid.as_deref(), Some(CYCLE_TID));

    // Replay is a no-op.
    let reply = processor(&h).process(ip(), &cycle).await;
    assert!(reply.message.contains("already recorded"));
}

#[tokio::test]
async fn full_cancellation_deactivates_refunds_and_revokes() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(&server.url());
    confirmed_instalment(&h, &mut server).await;
    assert_eq!(h.catalog.delivered.lock().unwrap().len(), 1);

    let cancel = signed(json!({
        "event": { "tid": TID, "type": "INSTALMENT_CANCEL" },
        "merchant": { "vendor": 4, "project": 14 },
        "result": { "status": "SUCCESS" },
        "transaction": {
            "tid": TID,
            "payment_type": "INSTALMENT_INVOICE",
            "status": "CONFIRMED",
            "amount": 1998,
            "currency": "EUR"
        },
        "instalment": { "cancel_type": "ALL_CYCLES" }
    }));
    let reply = processor(&h).process(ip(), &cancel).await;
    assert!(reply.message.contains("cancelled"));
    assert!(reply.message.contains("9.99 EUR"));

    let record = h.store.find_by_tid(TID).await.unwrap().unwrap();
    assert_eq!(record.gateway_status, GatewayStatus::Deactivated);
    assert_eq!(record.refunded_amount, 999);
    assert!(record.revoked);
    assert_eq!(h.catalog.revoked.lock().unwrap().len(), 1);
    match &record.additional_info {
        Some(AdditionalInfo::Instalments(plan)) => assert!(!plan.active),
        other => panic!("expected instalment schedule, got {other:?}"),
    }

    // A second cancellation does not run twice.
    let reply = processor(&h).process(ip(), &cancel).await;
    assert!(reply.message.contains("Status is not valid"));
    assert_eq!(h.catalog.revoked.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn remaining_cycles_cancellation_keeps_collected_money() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(&server.url());
    confirmed_instalment(&h, &mut server).await;

    let cancel = signed(json!({
        "event": { "tid": TID, "type": "INSTALMENT_CANCEL" },
        "merchant": { "vendor": 4, "project": 14 },
        "result": { "status": "SUCCESS" },
        "transaction": {
            "tid": TID,
            "payment_type": "INSTALMENT_INVOICE",
            "status": "CONFIRMED",
            "amount": 1998,
            "currency": "EUR"
        },
        "instalment": { "cancel_type": "REMAINING_CYCLES" }
    }));
    let reply = processor(&h).process(ip(), &cancel).await;
    assert!(reply.message.contains("stopped"));

    let record = h.store.find_by_tid(TID).await.unwrap().unwrap();
    assert_eq!(record.gateway_status, GatewayStatus::Deactivated);
    assert_eq!(record.refunded_amount, 0);
}

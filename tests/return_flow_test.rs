//! Return-redirect validation against a mocked processor API.

mod common;

use serde_json::json;

use common::{config, harness, seed_session, ACCESS_KEY};
use novalnet_gateway::checksum;
use novalnet_gateway::db::models::GatewayStatus;
use novalnet_gateway::notify::SyncDisposition;
use novalnet_gateway::return_flow::{handle_return, ReturnOutcome, ReturnParams};
use novalnet_gateway::store::TransactionStore;

const TID: &str = "14500000000012345";

fn params(status: &str, checksum: String) -> ReturnParams {
    ReturnParams {
        order_ref: "ord-1".to_string(),
        tid: TID.to_string(),
        txn_secret: "txnsecret".to_string(),
        status: status.to_string(),
        checksum,
        status_text: None,
    }
}

fn valid_checksum(status: &str) -> String {
    checksum::return_checksum(TID, "txnsecret", status, ACCESS_KEY)
}

async fn mock_details(server: &mut mockito::ServerGuard, body: serde_json::Value) -> mockito::Mock {
    server
        .mock("POST", "/transaction/details")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

#[tokio::test]
async fn confirmed_return_creates_and_delivers_the_record() {
    let mut server = mockito::Server::new_async().await;
    let _details = mock_details(
        &mut server,
        json!({
            "result": { "status": "SUCCESS" },
            "transaction": {
                "tid": TID,
                "payment_type": "CREDITCARD",
                "status": "CONFIRMED",
                "amount": 1500,
                "currency": "EUR",
                "test_mode": 1
            }
        }),
    )
    .await;
    let _bind = server
        .mock("POST", "/transaction/update")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{ "result": { "status": "SUCCESS" } }"#)
        .create_async()
        .await;

    let h = harness(&server.url());
    seed_session(h.store.as_ref(), "ord-1").await;

    let outcome = handle_return(&h.ctx, &config(), &params("SUCCESS", valid_checksum("SUCCESS")))
        .await
        .unwrap();

    match outcome {
        ReturnOutcome::Completed { disposition, tid, .. } => {
            assert_eq!(disposition, SyncDisposition::Success);
            assert_eq!(tid, TID);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    let record = h.store.find_by_tid(TID).await.unwrap().unwrap();
    assert_eq!(record.gateway_status, GatewayStatus::Confirmed);
    assert!(record.test_mode);
    assert!(record.delivered);
    assert_eq!(h.catalog.delivered.lock().unwrap().len(), 1);
    assert!(h.store.find_session("ord-1").await.unwrap().is_none());
}

#[tokio::test]
async fn altered_checksum_leaves_no_trace() {
    let mut server = mockito::Server::new_async().await;
    // The processor must not even be asked.
    let details = server
        .mock("POST", "/transaction/details")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{ "result": { "status": "SUCCESS" } }"#)
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server.url());
    seed_session(h.store.as_ref(), "ord-1").await;

    let mut tampered = valid_checksum("SUCCESS");
    tampered.replace_range(0..1, if tampered.starts_with('0') { "1" } else { "0" });

    let outcome = handle_return(&h.ctx, &config(), &params("SUCCESS", tampered))
        .await
        .unwrap();

    match outcome {
        ReturnOutcome::Failed { message } => assert!(message.contains("hash check failed")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(h.store.find_by_tid(TID).await.unwrap().is_none());
    assert!(h.catalog.delivered.lock().unwrap().is_empty());
    details.assert_async().await;
}

#[tokio::test]
async fn redirect_cannot_be_replayed_against_another_session() {
    let mut server = mockito::Server::new_async().await;
    // The transaction belongs to ord-paid; the redirect claims ord-other.
    let _details = mock_details(
        &mut server,
        json!({
            "result": { "status": "SUCCESS" },
            "transaction": {
                "tid": TID,
                "payment_type": "CREDITCARD",
                "status": "CONFIRMED",
                "amount": 1500,
                "currency": "EUR"
            },
            "custom": { "input1": "order_meta", "inputval1": "ord-paid" }
        }),
    )
    .await;

    let h = harness(&server.url());
    seed_session(h.store.as_ref(), "ord-other").await;

    // The checksum covers tid, secret and status but not the order
    // reference, so it still holds for the substituted session.
    let mut p = params("SUCCESS", valid_checksum("SUCCESS"));
    p.order_ref = "ord-other".to_string();

    let err = handle_return(&h.ctx, &config(), &p).await.unwrap_err();
    assert!(err.to_string().contains("order reference"));

    assert!(h.store.find_by_tid(TID).await.unwrap().is_none());
    assert!(h.catalog.delivered.lock().unwrap().is_empty());
    // The substituted session survives for its own payment.
    assert!(h.store.find_session("ord-other").await.unwrap().is_some());
}

#[tokio::test]
async fn failure_status_clears_the_session_and_keeps_no_record() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server.url());
    seed_session(h.store.as_ref(), "ord-1").await;

    let mut p = params("FAILURE", valid_checksum("FAILURE"));
    p.status_text = Some("Customer cancelled the payment".to_string());

    let outcome = handle_return(&h.ctx, &config(), &p).await.unwrap();
    match outcome {
        ReturnOutcome::Failed { message } => {
            assert_eq!(message, "Customer cancelled the payment");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(h.store.find_by_tid(TID).await.unwrap().is_none());
    assert!(h.store.find_session("ord-1").await.unwrap().is_none());
}

#[tokio::test]
async fn webhook_winning_the_race_is_reported_as_processed() {
    let mut server = mockito::Server::new_async().await;
    let _details = mock_details(
        &mut server,
        json!({
            "result": { "status": "SUCCESS" },
            "transaction": {
                "tid": TID,
                "payment_type": "INVOICE",
                "status": "PENDING",
                "amount": 1500,
                "currency": "EUR"
            }
        }),
    )
    .await;

    let h = harness(&server.url());
    // No session: the webhook already consumed it and wrote the record.
    use novalnet_gateway::db::models::NewTransaction;
    use novalnet_gateway::payment::PaymentType;
    h.store
        .insert(NewTransaction {
            order_ref: "ord-1".into(),
            user_id: 7,
            product_id: 3,
            customer_email: "jo@example.org".into(),
            tid: TID.into(),
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

    let outcome = handle_return(&h.ctx, &config(), &params("SUCCESS", valid_checksum("SUCCESS")))
        .await
        .unwrap();
    match outcome {
        ReturnOutcome::Completed { disposition, .. } => {
            assert_eq!(disposition, SyncDisposition::Pending);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

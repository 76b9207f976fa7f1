//! HTTP client for the payment processor API.

pub mod types;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::settings::{GatewayConfig, PaymentAction};
use types::{GatewayResponse, PaymentRequest};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Invalid response from processor: {0}")]
    InvalidResponse(String),
    #[error("Processor declined: {0}")]
    Declined(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Client for the processor's v2 JSON API.
///
/// Every call authenticates with the base64-encoded payment access key in the
/// `X-NN-Access-Key` header. Endpoint names map to URL paths by replacing
/// underscores with slashes, e.g. `seamless_payment` posts to
/// `/seamless/payment`.
#[derive(Clone)]
pub struct NovalnetClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl NovalnetClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        NovalnetClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    fn endpoint_url(&self, action: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            action.replace('_', "/")
        )
    }

    /// Posts a request body to the endpoint named by `action`.
    pub async fn send<B: Serialize>(
        &self,
        action: &str,
        access_key: &str,
        body: &B,
    ) -> Result<GatewayResponse, GatewayError> {
        let url = self.endpoint_url(action);
        debug!(action, "calling processor endpoint");

        let client = self.client.clone();
        let encoded_key = BASE64.encode(access_key);
        let body = serde_json::to_value(body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .header("Accept", "application/json")
                    .header("X-NN-Access-Key", encoded_key)
                    .json(&body)
                    .send()
                    .await?;

                let parsed = response.json::<GatewayResponse>().await?;
                Ok(parsed)
            })
            .await;

        match result {
            Ok(parsed) => Ok(parsed),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "processor API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Starts a hosted-page payment and returns the processor response with
    /// the redirect target.
    pub async fn initiate(
        &self,
        config: &GatewayConfig,
        action: PaymentAction,
        request: &PaymentRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let endpoint = match action {
            PaymentAction::Payment => "seamless_payment",
            PaymentAction::Authorize => "seamless_authorize",
        };
        let response = self.send(endpoint, &config.access_key, request).await?;
        if !response.result.is_success() {
            return Err(GatewayError::Declined(
                response
                    .result
                    .status_text
                    .clone()
                    .unwrap_or_else(|| response.result.status.clone()),
            ));
        }
        Ok(response)
    }

    /// Fetches the authoritative state of a transaction.
    pub async fn transaction_details(
        &self,
        config: &GatewayConfig,
        tid: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        let body = json!({
            "merchant": { "signature": config.signature },
            "transaction": { "tid": tid },
        });
        self.send("transaction_details", &config.access_key, &body)
            .await
    }

    /// Attaches the shop's order number to a transaction. The reflected
    /// `shop_invoked` marker lets the webhook tell our own updates apart from
    /// merchant-portal ones.
    pub async fn bind_order(
        &self,
        config: &GatewayConfig,
        tid: &str,
        order_no: &str,
        invoice_ref: Option<&str>,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut transaction = json!({ "tid": tid, "order_no": order_no });
        if let Some(invoice_ref) = invoice_ref {
            transaction["invoice_ref"] = json!(invoice_ref);
        }
        let body = json!({
            "merchant": { "signature": config.signature },
            "transaction": transaction,
            "custom": { "shop_invoked": 1 },
        });
        self.send("transaction_update", &config.access_key, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GatewayConfig {
        serde_json::from_value(json!({
            "signature": "sig",
            "access_key": "a87ff679a2f3e71d9181a67b7542122c",
            "tariff": "10004"
        }))
        .unwrap()
    }

    #[test]
    fn endpoint_maps_underscores_to_path_segments() {
        let client = NovalnetClient::new("https://payport.example.test/v2/".to_string());
        assert_eq!(
            client.endpoint_url("seamless_payment"),
            "https://payport.example.test/v2/seamless/payment"
        );
        assert_eq!(
            client.endpoint_url("transaction_details"),
            "https://payport.example.test/v2/transaction/details"
        );
    }

    #[tokio::test]
    async fn sends_encoded_access_key_header() {
        let mut server = mockito::Server::new_async().await;
        let encoded = BASE64.encode("a87ff679a2f3e71d9181a67b7542122c");

        let mock = server
            .mock("POST", "/transaction/details")
            .match_header("x-nn-access-key", encoded.as_str())
            .match_header("accept", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "result": { "status": "SUCCESS", "status_code": 100 },
                    "transaction": { "tid": 14500000000012345, "status": "CONFIRMED" }
                }"#,
            )
            .create_async()
            .await;

        let client = NovalnetClient::new(server.url());
        let response = client
            .transaction_details(&test_config(), "14500000000012345")
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(response.result.is_success());
        let transaction = response.transaction.unwrap();
        assert_eq!(transaction.tid.as_deref(), Some("14500000000012345"));
        assert_eq!(transaction.status.as_deref(), Some("CONFIRMED"));
    }

    #[tokio::test]
    async fn bind_order_marks_request_as_shop_invoked() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/transaction/update")
            .match_body(mockito::Matcher::PartialJson(json!({
                "transaction": { "tid": "14500000000012345", "order_no": "42" },
                "custom": { "shop_invoked": 1 },
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{ "result": { "status": "SUCCESS" } }"#)
            .create_async()
            .await;

        let client = NovalnetClient::new(server.url());
        let response = client
            .bind_order(&test_config(), "14500000000012345", "42", None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(response.result.is_success());
    }

    #[tokio::test]
    async fn declined_initiation_surfaces_status_text() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/seamless/payment")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{ "result": { "status": "FAILURE", "status_text": "Card declined" } }"#,
            )
            .create_async()
            .await;

        let client = NovalnetClient::new(server.url());
        let request = sample_request();
        let result = client
            .initiate(&test_config(), PaymentAction::Payment, &request)
            .await;

        match result {
            Err(GatewayError::Declined(text)) => assert_eq!(text, "Card declined"),
            other => panic!("expected decline, got {other:?}"),
        }
    }

    fn sample_request() -> PaymentRequest {
        use types::*;
        PaymentRequest {
            merchant: MerchantSection {
                signature: "sig".into(),
                tariff: "10004".into(),
            },
            customer: CustomerSection {
                email: "jo@example.org".into(),
                ..Default::default()
            },
            transaction: TransactionSection {
                payment_type: "INVOICE".into(),
                amount: 1500,
                currency: "EUR".into(),
                test_mode: 1,
                order_no: None,
                due_date: None,
                return_url: None,
                error_return_url: None,
                hook_url: None,
                invoice_ref: None,
            },
            hosted_page: HostedPageSection {
                display_payments: vec!["INVOICE".into()],
                hide_blocks: vec![],
                skip_pages: vec![],
            },
            custom: None,
            instalment: None,
            cart_info: None,
        }
    }
}

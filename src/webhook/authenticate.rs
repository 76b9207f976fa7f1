//! Webhook authentication: sender IP, payload completeness and checksum.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};
use tokio::net::lookup_host;

use crate::checksum;
use crate::settings::GatewayConfig;
use crate::webhook::{WebhookPayload, WebhookReply};

/// Forwarding headers consulted for the original sender, most trustworthy
/// first. Falls back to the socket peer address.
const FORWARD_HEADERS: &[&str] = &[
    "x-forwarded-host",
    "client-ip",
    "x-real-ip",
    "x-forwarded-for",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
];

pub fn client_ip(headers: &HeaderMap, remote: SocketAddr) -> IpAddr {
    for name in FORWARD_HEADERS {
        let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        // Proxy chains append; the first entry is the original client.
        let first = value.split(',').next().unwrap_or("").trim();
        if let Ok(ip) = first.parse::<IpAddr>() {
            return ip;
        }
    }
    remote.ip()
}

/// Whether `client_ip` is one of the addresses the processor's published
/// hostname resolves to.
pub async fn sender_allowed(allowed_host: &str, client_ip: IpAddr) -> std::io::Result<bool> {
    let addresses = lookup_host((allowed_host, 443)).await?;
    Ok(addresses.into_iter().any(|addr| addr.ip() == client_ip))
}

fn is_valid_tid(tid: &str) -> bool {
    tid.len() == 17 && tid.bytes().all(|b| b.is_ascii_digit())
}

/// Structural and cryptographic payload checks. Returns the reply to send
/// when the payload must not be processed.
pub fn validate_payload(
    payload: &WebhookPayload,
    config: &GatewayConfig,
) -> Result<(), WebhookReply> {
    let missing = || WebhookReply::new("A necessary parameter is missing from the request.");

    let event = payload.event.as_ref().ok_or_else(missing)?;
    let event_tid = event.tid.as_deref().filter(|t| !t.is_empty()).ok_or_else(missing)?;
    let event_type = event
        .event_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(missing)?;
    let received_checksum = event
        .checksum
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(missing)?;

    let merchant = payload.merchant.as_ref().ok_or_else(missing)?;
    if merchant.vendor.as_deref().unwrap_or("").is_empty()
        || merchant.project.as_deref().unwrap_or("").is_empty()
    {
        return Err(missing());
    }

    let result = payload.result.as_ref().ok_or_else(missing)?;
    if result.status.is_empty() {
        return Err(missing());
    }

    let transaction = payload.transaction.as_ref().ok_or_else(missing)?;
    let txn_tid = transaction
        .info
        .tid
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(missing)?;
    if transaction.info.payment_type.is_none()
        || transaction.info.status.as_deref().unwrap_or("").is_empty()
    {
        return Err(missing());
    }

    if !is_valid_tid(event_tid) || !is_valid_tid(txn_tid) {
        return Err(WebhookReply::new("Invalid transaction ID received."));
    }
    if let Some(parent_tid) = event.parent_tid.as_deref() {
        if !parent_tid.is_empty() && !is_valid_tid(parent_tid) {
            return Err(WebhookReply::new("Invalid transaction ID received."));
        }
    }

    let expected = checksum::webhook_checksum(
        event_tid,
        event_type,
        &result.status,
        transaction.info.amount,
        transaction.info.currency.as_deref(),
        &config.access_key,
    );
    if !checksum::verify(&expected, received_checksum) {
        return Err(WebhookReply::new(
            "While notifying some data has been changed. The hash check failed.",
        ));
    }

    // Update events this system triggered itself come back with the
    // reflected marker; processing them again would loop.
    if payload
        .custom
        .as_ref()
        .map(|custom| custom.is_shop_invoked())
        .unwrap_or(false)
    {
        return Err(WebhookReply::new(
            "Novalnet callback received. Callback Script executed already.",
        ));
    }

    Ok(())
}

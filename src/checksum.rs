//! SHA-256 checksums protecting the redirect return flow and webhook payloads.
//!
//! Both variants concatenate payload fields with the merchant access key
//! reversed character-wise, then hex-encode the digest.

use sha2::{Digest, Sha256};

fn reversed_key(access_key: &str) -> String {
    access_key.chars().rev().collect()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checksum appended to the hosted-page redirect back to the shop:
/// `sha256(tid . txn_secret . status . reverse(access_key))`.
pub fn return_checksum(tid: &str, txn_secret: &str, status: &str, access_key: &str) -> String {
    let input = format!("{tid}{txn_secret}{status}{}", reversed_key(access_key));
    sha256_hex(&input)
}

/// Checksum carried in webhook payloads:
/// `sha256(event.tid . event.type . result.status [. amount] [. currency] . reverse(access_key))`.
///
/// Amount and currency participate only when present in the payload.
pub fn webhook_checksum(
    event_tid: &str,
    event_type: &str,
    result_status: &str,
    amount: Option<i64>,
    currency: Option<&str>,
    access_key: &str,
) -> String {
    let mut input = format!("{event_tid}{event_type}{result_status}");
    if let Some(amount) = amount {
        input.push_str(&amount.to_string());
    }
    if let Some(currency) = currency {
        input.push_str(currency);
    }
    input.push_str(&reversed_key(access_key));
    sha256_hex(&input)
}

/// Constant-shape comparison of a received checksum against the expected one.
pub fn verify(expected: &str, received: &str) -> bool {
    expected.len() == received.len()
        && expected
            .bytes()
            .zip(received.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

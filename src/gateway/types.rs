//! Wire shapes for the processor's JSON API.
//!
//! The processor emits transaction identifiers and amounts as JSON numbers in
//! some payloads and as strings in others, so the deserializers here accept
//! both.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::payment::PaymentType;

/// Accepts a JSON string or number and yields a `String`.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            )))
        }
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub status_code: Option<String>,
    #[serde(default)]
    pub status_text: Option<String>,
}

impl ResultInfo {
    pub fn is_success(&self) -> bool {
        self.status == "SUCCESS"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BankDetails {
    #[serde(default)]
    pub account_holder: Option<String>,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub bic: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub bank_place: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct NearestStore {
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// Instalment block echoed on instalment transactions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstalmentInfo {
    #[serde(default, deserialize_with = "string_or_number")]
    pub tid: Option<String>,
    #[serde(default)]
    pub cycle_amount: Option<i64>,
    #[serde(default)]
    pub cycles_executed: Option<u32>,
    #[serde(default)]
    pub pending_cycles: Option<u32>,
    #[serde(default)]
    pub next_cycle_date: Option<String>,
    #[serde(default)]
    pub cycle_dates: Option<serde_json::Map<String, Value>>,
    /// Present on instalment cancellation events: `ALL_CYCLES` or
    /// `REMAINING_CYCLES`.
    #[serde(default)]
    pub cancel_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransactionInfo {
    #[serde(default, deserialize_with = "string_or_number")]
    pub tid: Option<String>,
    #[serde(default)]
    pub payment_type: Option<PaymentType>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub test_mode: Option<u8>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub order_no: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub invoice_ref: Option<String>,
    /// Multibanco slip reference.
    #[serde(default, deserialize_with = "string_or_number")]
    pub partner_payment_reference: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub service_supplier_id: Option<String>,
    #[serde(default)]
    pub txn_secret: Option<String>,
    #[serde(default)]
    pub bank_details: Option<BankDetails>,
    #[serde(default)]
    pub nearest_stores: Option<Vec<NearestStore>>,
    /// Concrete sub-method for redirect umbrellas, e.g. the bank behind an
    /// online transfer.
    #[serde(default)]
    pub payment_data: Option<Value>,
    #[serde(default)]
    pub refund: Option<RefundInfo>,
    #[serde(default)]
    pub refunded_amount: Option<i64>,
}

/// Custom fields passed through the processor unchanged and echoed back on
/// webhooks and transaction detail responses.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CustomFields {
    #[serde(default)]
    pub order_meta: Option<String>,
    #[serde(default)]
    pub input1: Option<String>,
    #[serde(default)]
    pub inputval1: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub shop_invoked: Option<String>,
}

impl CustomFields {
    /// Shop purchase reference carried through the processor, either in the
    /// dedicated field or the generic input slot.
    pub fn order_ref(&self) -> Option<&str> {
        if let Some(meta) = self.order_meta.as_deref() {
            return Some(meta);
        }
        if self.input1.as_deref() == Some("order_meta") {
            return self.inputval1.as_deref();
        }
        None
    }

    /// Marker reflected on update calls this system itself made.
    pub fn is_shop_invoked(&self) -> bool {
        matches!(self.shop_invoked.as_deref(), Some(v) if !v.is_empty() && v != "0")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RefundInfo {
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub tid: Option<String>,
}

/// Response envelope shared by all processor endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayResponse {
    pub result: ResultInfo,
    #[serde(default)]
    pub transaction: Option<TransactionInfo>,
    #[serde(default)]
    pub instalment: Option<InstalmentInfo>,
    /// Custom fields echoed back, carrying the shop purchase reference.
    #[serde(default)]
    pub custom: Option<CustomFields>,
    /// Hosted-page endpoints return the redirect target here.
    #[serde(default)]
    pub redirect_url: Option<String>,
}

// --- request side ---

#[derive(Debug, Clone, Serialize)]
pub struct MerchantSection {
    pub signature: String,
    pub tariff: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct BillingSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CustomerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionSection {
    pub payment_type: String,
    pub amount: i64,
    pub currency: String,
    pub test_mode: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostedPageSection {
    pub display_payments: Vec<String>,
    pub hide_blocks: Vec<String>,
    pub skip_pages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CustomSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputval1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_invoked: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstalmentSection {
    pub preselected_cycle: u32,
    pub cycles_list: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLineItem {
    pub name: String,
    pub price: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartSection {
    pub line_items: Vec<CartLineItem>,
}

/// Request body for payment initiation against the hosted-page endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub merchant: MerchantSection,
    pub customer: CustomerSection,
    pub transaction: TransactionSection,
    pub hosted_page: HostedPageSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instalment: Option<InstalmentSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_info: Option<CartSection>,
}

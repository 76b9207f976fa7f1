//! Domain records tracked for every payment transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::types::{BankDetails, NearestStore};
use crate::instalment::InstalmentPlan;
use crate::payment::PaymentType;

/// Processor-side lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Pending,
    OnHold,
    Confirmed,
    Deactivated,
    Failure,
}

impl GatewayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::OnHold => "ON_HOLD",
            Self::Confirmed => "CONFIRMED",
            Self::Deactivated => "DEACTIVATED",
            Self::Failure => "FAILURE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "ON_HOLD" => Some(Self::OnHold),
            "CONFIRMED" => Some(Self::Confirmed),
            "DEACTIVATED" => Some(Self::Deactivated),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }

    /// Legal forward moves. Terminal states accept nothing; webhooks arriving
    /// out of order must not resurrect a finished transaction.
    pub fn can_transition_to(self, next: GatewayStatus) -> bool {
        if self == next {
            return false;
        }
        match self {
            Self::Pending => matches!(
                next,
                Self::OnHold | Self::Confirmed | Self::Deactivated | Self::Failure
            ),
            Self::OnHold => matches!(next, Self::Confirmed | Self::Deactivated),
            Self::Confirmed => matches!(next, Self::Deactivated),
            Self::Deactivated | Self::Failure => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deactivated | Self::Failure)
    }
}

/// Payment-reference data shown to the customer until the amount arrives,
/// stored as JSON alongside the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdditionalInfo {
    /// Bank account to transfer to (invoice, prepayment, guarantee variants).
    Bank {
        details: BankDetails,
        #[serde(default)]
        due_date: Option<String>,
        #[serde(default)]
        invoice_ref: Option<String>,
    },
    /// Instalment schedule with per-cycle state.
    Instalments(InstalmentPlan),
    /// Multibanco payment slip references.
    Multibanco {
        partner_payment_reference: String,
        #[serde(default)]
        service_supplier_id: Option<String>,
    },
    /// Cash payment slip with the nearest acceptance stores.
    Stores {
        #[serde(default)]
        due_date: Option<String>,
        stores: Vec<NearestStore>,
    },
}

/// One tracked payment transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    /// Shop-side purchase reference, carried through the processor's custom
    /// metadata and used to correlate webhooks.
    pub order_ref: String,
    pub user_id: i64,
    pub product_id: i64,
    pub customer_email: String,
    pub tid: String,
    pub payment_type: PaymentType,
    pub gateway_status: GatewayStatus,
    /// Order amount in minor units.
    pub amount: i64,
    pub currency: String,
    /// Sum received so far on pay-later methods; equals `amount` immediately
    /// on direct methods once confirmed.
    pub paid_amount: i64,
    pub refunded_amount: i64,
    pub test_mode: bool,
    /// Shop order number bound at the processor after delivery.
    pub order_no: Option<String>,
    pub additional_info: Option<AdditionalInfo>,
    /// The customer transferred more than the amount due.
    pub overpaid: bool,
    /// Product access has been handed out.
    pub delivered: bool,
    /// Product access has been revoked. Revocation happens at most once.
    pub revoked: bool,
    pub comments: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Open amount on a pay-later transaction.
    pub fn amount_due(&self) -> i64 {
        (self.amount - self.refunded_amount - self.paid_amount).max(0)
    }

    pub fn instalment_plan(&self) -> Option<&InstalmentPlan> {
        match &self.additional_info {
            Some(AdditionalInfo::Instalments(plan)) => Some(plan),
            _ => None,
        }
    }
}

/// Correlation data captured at initiation, before the processor assigned a
/// transaction id. Cleared once the purchase reaches a final state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseSession {
    pub order_ref: String,
    pub user_id: i64,
    pub product_id: i64,
    pub customer_email: String,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a record at initiation or first webhook contact.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub order_ref: String,
    pub user_id: i64,
    pub product_id: i64,
    pub customer_email: String,
    pub tid: String,
    pub payment_type: PaymentType,
    pub gateway_status: GatewayStatus,
    pub amount: i64,
    pub currency: String,
    pub paid_amount: i64,
    pub test_mode: bool,
    pub additional_info: Option<AdditionalInfo>,
    pub comments: String,
}

/// Partial update merged into an existing record. `None` leaves the stored
/// value untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub tid: Option<String>,
    pub payment_type: Option<PaymentType>,
    pub gateway_status: Option<GatewayStatus>,
    pub amount: Option<i64>,
    pub paid_amount: Option<i64>,
    pub refunded_amount: Option<i64>,
    pub order_no: Option<String>,
    pub additional_info: Option<AdditionalInfo>,
    pub overpaid: Option<bool>,
    pub delivered: Option<bool>,
    pub revoked: Option<bool>,
    pub append_comments: Vec<String>,
}

impl RecordPatch {
    pub fn status(status: GatewayStatus) -> Self {
        Self {
            gateway_status: Some(status),
            ..Default::default()
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            append_comments: vec![text.into()],
            ..Default::default()
        }
    }

    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.append_comments.push(text.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tid.is_none()
            && self.payment_type.is_none()
            && self.gateway_status.is_none()
            && self.amount.is_none()
            && self.paid_amount.is_none()
            && self.refunded_amount.is_none()
            && self.order_no.is_none()
            && self.additional_info.is_none()
            && self.overpaid.is_none()
            && self.delivered.is_none()
            && self.revoked.is_none()
            && self.append_comments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_reaches_every_state_once() {
        use GatewayStatus::*;
        for next in [OnHold, Confirmed, Deactivated, Failure] {
            assert!(Pending.can_transition_to(next));
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn on_hold_cannot_fall_back_to_pending() {
        use GatewayStatus::*;
        assert!(OnHold.can_transition_to(Confirmed));
        assert!(OnHold.can_transition_to(Deactivated));
        assert!(!OnHold.can_transition_to(Pending));
        assert!(!OnHold.can_transition_to(Failure));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        use GatewayStatus::*;
        for terminal in [Deactivated, Failure] {
            assert!(terminal.is_terminal());
            for next in [Pending, OnHold, Confirmed, Deactivated, Failure] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn amount_due_never_goes_negative() {
        let record = TransactionRecord {
            id: 1,
            order_ref: "ord-1".into(),
            user_id: 7,
            product_id: 3,
            customer_email: "jo@example.org".into(),
            tid: "14500000000012345".into(),
            payment_type: PaymentType::Invoice,
            gateway_status: GatewayStatus::Pending,
            amount: 1000,
            currency: "EUR".into(),
            paid_amount: 1500,
            refunded_amount: 0,
            test_mode: true,
            order_no: None,
            additional_info: None,
            overpaid: true,
            delivered: false,
            revoked: false,
            comments: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(record.amount_due(), 0);
    }

    #[test]
    fn additional_info_round_trips_as_tagged_json() {
        let info = AdditionalInfo::Stores {
            due_date: Some("2026-09-10".into()),
            stores: vec![NearestStore {
                store_name: Some("Kiosk Mitte".into()),
                city: Some("Berlin".into()),
                ..Default::default()
            }],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["kind"], "stores");
        let back: AdditionalInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }
}

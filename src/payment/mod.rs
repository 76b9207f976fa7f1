//! Payment method codes and their capability sets.

pub mod eligibility;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment method codes understood by the processor, including the follow-up
/// credit/collection sub-types that only ever appear in webhook payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    DirectDebitSepa,
    DirectDebitAch,
    Creditcard,
    Applepay,
    Googlepay,
    Invoice,
    Prepayment,
    GuaranteedInvoice,
    GuaranteedDirectDebitSepa,
    InstalmentInvoice,
    InstalmentDirectDebitSepa,
    Ideal,
    OnlineTransfer,
    Giropay,
    Cashpayment,
    Przelewy24,
    Eps,
    Paypal,
    Mbway,
    Postfinance,
    PostfinanceCard,
    Bancontact,
    Multibanco,
    OnlineBankTransfer,
    Alipay,
    Wechatpay,
    Trustly,
    Blik,
    // Follow-up types reported by webhooks only.
    OnlineTransferCredit,
    InvoiceCredit,
    CashpaymentCredit,
    MultibancoCredit,
    CreditEntrySepa,
    DebtCollectionSepa,
    CreditEntryCreditcard,
    DebtCollectionCreditcard,
    CreditcardRepresentment,
    BankTransferByEndCustomer,
    GooglepayRepresentment,
    ApplepayRepresentment,
    DebtCollectionDe,
    CreditEntryDe,
    #[serde(other)]
    Unknown,
}

impl PaymentType {
    /// The wire code for this method, e.g. `DIRECT_DEBIT_SEPA`.
    pub fn code(self) -> &'static str {
        match self {
            Self::DirectDebitSepa => "DIRECT_DEBIT_SEPA",
            Self::DirectDebitAch => "DIRECT_DEBIT_ACH",
            Self::Creditcard => "CREDITCARD",
            Self::Applepay => "APPLEPAY",
            Self::Googlepay => "GOOGLEPAY",
            Self::Invoice => "INVOICE",
            Self::Prepayment => "PREPAYMENT",
            Self::GuaranteedInvoice => "GUARANTEED_INVOICE",
            Self::GuaranteedDirectDebitSepa => "GUARANTEED_DIRECT_DEBIT_SEPA",
            Self::InstalmentInvoice => "INSTALMENT_INVOICE",
            Self::InstalmentDirectDebitSepa => "INSTALMENT_DIRECT_DEBIT_SEPA",
            Self::Ideal => "IDEAL",
            Self::OnlineTransfer => "ONLINE_TRANSFER",
            Self::Giropay => "GIROPAY",
            Self::Cashpayment => "CASHPAYMENT",
            Self::Przelewy24 => "PRZELEWY24",
            Self::Eps => "EPS",
            Self::Paypal => "PAYPAL",
            Self::Mbway => "MBWAY",
            Self::Postfinance => "POSTFINANCE",
            Self::PostfinanceCard => "POSTFINANCE_CARD",
            Self::Bancontact => "BANCONTACT",
            Self::Multibanco => "MULTIBANCO",
            Self::OnlineBankTransfer => "ONLINE_BANK_TRANSFER",
            Self::Alipay => "ALIPAY",
            Self::Wechatpay => "WECHATPAY",
            Self::Trustly => "TRUSTLY",
            Self::Blik => "BLIK",
            Self::OnlineTransferCredit => "ONLINE_TRANSFER_CREDIT",
            Self::InvoiceCredit => "INVOICE_CREDIT",
            Self::CashpaymentCredit => "CASHPAYMENT_CREDIT",
            Self::MultibancoCredit => "MULTIBANCO_CREDIT",
            Self::CreditEntrySepa => "CREDIT_ENTRY_SEPA",
            Self::DebtCollectionSepa => "DEBT_COLLECTION_SEPA",
            Self::CreditEntryCreditcard => "CREDIT_ENTRY_CREDITCARD",
            Self::DebtCollectionCreditcard => "DEBT_COLLECTION_CREDITCARD",
            Self::CreditcardRepresentment => "CREDITCARD_REPRESENTMENT",
            Self::BankTransferByEndCustomer => "BANK_TRANSFER_BY_END_CUSTOMER",
            Self::GooglepayRepresentment => "GOOGLEPAY_REPRESENTMENT",
            Self::ApplepayRepresentment => "APPLEPAY_REPRESENTMENT",
            Self::DebtCollectionDe => "DEBT_COLLECTION_DE",
            Self::CreditEntryDe => "CREDIT_ENTRY_DE",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(code.to_string())).ok()
    }

    /// Human-readable method name for comments and notification mails.
    pub fn label(self) -> &'static str {
        match self {
            Self::DirectDebitSepa => "Direct Debit SEPA",
            Self::DirectDebitAch => "Direct Debit ACH",
            Self::Creditcard => "Credit/Debit Cards",
            Self::Applepay => "Apple Pay",
            Self::Googlepay => "Google Pay",
            Self::Invoice => "Invoice",
            Self::Prepayment => "Prepayment",
            Self::GuaranteedInvoice => "Invoice with payment guarantee",
            Self::GuaranteedDirectDebitSepa => "Direct Debit SEPA with payment guarantee",
            Self::InstalmentInvoice => "Instalment by invoice",
            Self::InstalmentDirectDebitSepa => "Instalment by SEPA direct debit",
            Self::Ideal => "iDEAL",
            Self::OnlineTransfer => "Sofort",
            Self::Giropay => "giropay",
            Self::Cashpayment => "Barzahlen/viacash",
            Self::Przelewy24 => "Przelewy24",
            Self::Eps => "eps",
            Self::Paypal => "PayPal",
            Self::Mbway => "MB Way",
            Self::Postfinance => "PostFinance E-Finance",
            Self::PostfinanceCard => "PostFinance Card",
            Self::Bancontact => "Bancontact",
            Self::Multibanco => "Multibanco",
            Self::OnlineBankTransfer => "Online bank transfer",
            Self::Alipay => "Alipay",
            Self::Wechatpay => "WeChat Pay",
            Self::Trustly => "Trustly",
            Self::Blik => "Blik",
            Self::OnlineTransferCredit => "Online transfer credit",
            other => other.code(),
        }
    }

    /// Methods that can be held for manual capture.
    pub fn supports_authorize(self) -> bool {
        matches!(
            self,
            Self::Creditcard
                | Self::Applepay
                | Self::Googlepay
                | Self::DirectDebitSepa
                | Self::Paypal
                | Self::Invoice
                | Self::Prepayment
                | Self::GuaranteedDirectDebitSepa
                | Self::GuaranteedInvoice
                | Self::InstalmentInvoice
                | Self::InstalmentDirectDebitSepa
        )
    }

    pub fn supports_instalment(self) -> bool {
        matches!(
            self,
            Self::InstalmentDirectDebitSepa | Self::InstalmentInvoice
        )
    }

    pub fn supports_guarantee(self) -> bool {
        matches!(
            self,
            Self::GuaranteedDirectDebitSepa | Self::GuaranteedInvoice
        )
    }

    /// Methods where the customer pays after checkout (bank transfer, cash).
    pub fn is_pay_later(self) -> bool {
        matches!(
            self,
            Self::Invoice | Self::Prepayment | Self::Cashpayment | Self::Multibanco
        )
    }

    pub fn is_invoice_family(self) -> bool {
        matches!(
            self,
            Self::Invoice | Self::InstalmentInvoice | Self::GuaranteedInvoice
        )
    }

    pub fn is_sepa_family(self) -> bool {
        matches!(
            self,
            Self::DirectDebitSepa | Self::InstalmentDirectDebitSepa | Self::GuaranteedDirectDebitSepa
        )
    }

    pub fn supports_due_date(self) -> bool {
        matches!(
            self,
            Self::DirectDebitSepa | Self::Prepayment | Self::Invoice | Self::Cashpayment
        )
    }

    /// Methods that need the hosted payment-entry page (card/IBAN form).
    pub fn is_form_type(self) -> bool {
        matches!(
            self,
            Self::DirectDebitSepa
                | Self::Creditcard
                | Self::GuaranteedDirectDebitSepa
                | Self::InstalmentDirectDebitSepa
                | Self::GuaranteedInvoice
                | Self::InstalmentInvoice
                | Self::Applepay
                | Self::Googlepay
                | Self::DirectDebitAch
                | Self::Mbway
        )
    }

    /// Credit sub-types that count toward the amount due on a pay-later order.
    pub fn is_payable_credit(self) -> bool {
        matches!(
            self,
            Self::InvoiceCredit
                | Self::CashpaymentCredit
                | Self::MultibancoCredit
                | Self::OnlineTransferCredit
        )
    }

    /// Chargeback/collection credit sub-types that are logged without any
    /// state change.
    pub fn is_collection_credit(self) -> bool {
        matches!(
            self,
            Self::CreditEntrySepa
                | Self::DebtCollectionSepa
                | Self::CreditEntryCreditcard
                | Self::DebtCollectionCreditcard
                | Self::CreditcardRepresentment
                | Self::BankTransferByEndCustomer
                | Self::GooglepayRepresentment
                | Self::ApplepayRepresentment
                | Self::DebtCollectionDe
                | Self::CreditEntryDe
        )
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Fixed checkout display order. Unknown codes sort last, ties keep their
/// configured order (stable sort).
const DISPLAY_ORDER: &[&str] = &[
    "DIRECT_DEBIT_SEPA",
    "DIRECT_DEBIT_ACH",
    "CREDITCARD",
    "APPLEPAY",
    "GOOGLEPAY",
    "INVOICE",
    "PREPAYMENT",
    "GUARANTEED_INVOICE",
    "GUARANTEED_DIRECT_DEBIT_SEPA",
    "INSTALMENT_INVOICE",
    "INSTALMENT_DIRECT_DEBIT_SEPA",
    "IDEAL",
    "ONLINE_TRANSFER",
    "GIROPAY",
    "CASHPAYMENT",
    "PRZELEWY24",
    "EPS",
    "PAYPAL",
    "MBWAY",
    "POSTFINANCE",
    "POSTFINANCE_CARD",
    "BANCONTACT",
    "MULTIBANCO",
    "ONLINE_BANK_TRANSFER",
    "ALIPAY",
    "WECHATPAY",
    "TRUSTLY",
    "BLIK",
];

pub fn display_priority(code: &str) -> usize {
    DISPLAY_ORDER
        .iter()
        .position(|candidate| *candidate == code)
        .unwrap_or(usize::MAX)
}

pub fn sort_by_display_priority(methods: &mut Vec<String>) {
    methods.sort_by_key(|code| display_priority(code));
}

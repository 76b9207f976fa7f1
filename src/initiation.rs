//! Building and sending the hosted-page payment initiation.

use chrono::{Days, Utc};

use crate::db::models::PurchaseSession;
use crate::error::AppError;
use crate::gateway::types::{
    BillingSection, CartLineItem, CartSection, CustomSection, CustomerSection, HostedPageSection,
    InstalmentSection, MerchantSection, PaymentRequest, TransactionSection,
};
use crate::lifecycle::PaymentContext;
use crate::payment::PaymentType;
use crate::settings::{GatewayConfig, MethodSettings, PaymentAction};

/// Customer data collected at checkout.
#[derive(Debug, Clone, Default)]
pub struct CustomerProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub customer_no: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub company: Option<String>,
    /// ISO date, `YYYY-MM-DD`.
    pub birth_date: Option<String>,
}

/// Everything needed to start one hosted-page payment.
#[derive(Debug, Clone)]
pub struct InitiationRequest {
    pub order_ref: String,
    pub user_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub currency: String,
    pub customer: CustomerProfile,
    pub language: Option<String>,
}

/// The redirect target handed back to the checkout page.
#[derive(Debug, Clone)]
pub struct InitiationOutcome {
    pub redirect_url: String,
    pub tid: Option<String>,
}

/// Whether this payment goes out as an authorization instead of a direct
/// charge. A merchant-configured minimum that does not parse as a positive
/// integer counts as "no minimum".
pub fn authorize_applies(settings: &MethodSettings, ty: PaymentType, amount: i64) -> bool {
    if !ty.supports_authorize() || settings.action != PaymentAction::Authorize {
        return false;
    }
    match settings.authorize_min_amount.as_deref() {
        None => true,
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(limit) if limit > 0 => amount >= limit,
            _ => true,
        },
    }
}

fn due_date_from_today(days: u32) -> String {
    Utc::now()
        .date_naive()
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or_else(|| Utc::now().date_naive())
        .format("%Y-%m-%d")
        .to_string()
}

/// Assembles the request body for the hosted page.
pub fn build_payment_request(
    config: &GatewayConfig,
    public_base_url: &str,
    request: &InitiationRequest,
) -> PaymentRequest {
    let settings = config.method(request.payment_type);
    let base = public_base_url.trim_end_matches('/');

    // Guarantee checks run against the personal billing data; a birth date
    // marks a consumer purchase, so any stray company entry is dropped.
    let company = if request.customer.birth_date.is_some() {
        None
    } else {
        request.customer.company.clone()
    };
    let billing = BillingSection {
        street: request.customer.street.clone(),
        city: request.customer.city.clone(),
        zip: request.customer.zip.clone(),
        country_code: request.customer.country.clone(),
        company,
    };

    let due_date = settings
        .due_date
        .filter(|_| request.payment_type.supports_due_date())
        .map(due_date_from_today);

    let mut skip_pages = vec!["CONFIRMATION_PAGE".to_string(), "SUCCESS_PAGE".to_string()];
    if !request.payment_type.is_form_type() {
        skip_pages.push("PAYMENT_PAGE".to_string());
    }

    let instalment = request
        .payment_type
        .supports_instalment()
        .then(|| {
            let cycles: Vec<u32> = settings
                .instalment_cycles
                .iter()
                .copied()
                .filter(|c| *c > 1)
                .collect();
            cycles.iter().copied().min().map(|preselected| InstalmentSection {
                preselected_cycle: preselected,
                cycles_list: cycles,
            })
        })
        .flatten();

    let cart_info = (request.payment_type == PaymentType::Paypal).then(|| CartSection {
        line_items: vec![CartLineItem {
            name: request.product_name.clone(),
            price: request.amount,
            quantity: 1,
        }],
    });

    PaymentRequest {
        merchant: MerchantSection {
            signature: config.signature.clone(),
            tariff: config.tariff.clone(),
        },
        customer: CustomerSection {
            first_name: request.customer.first_name.clone(),
            last_name: request.customer.last_name.clone(),
            email: request.customer.email.clone(),
            customer_no: request.customer.customer_no.clone(),
            billing: Some(billing),
            birth_date: request.customer.birth_date.clone(),
        },
        transaction: TransactionSection {
            payment_type: request.payment_type.code().to_string(),
            amount: request.amount,
            currency: request.currency.clone(),
            test_mode: u8::from(config.is_test_mode()),
            order_no: None,
            due_date,
            return_url: Some(format!(
                "{base}/payments/return?order_ref={}",
                request.order_ref
            )),
            error_return_url: Some(format!(
                "{base}/payments/return?order_ref={}",
                request.order_ref
            )),
            hook_url: Some(format!("{base}/webhooks/novalnet")),
            invoice_ref: None,
        },
        hosted_page: HostedPageSection {
            display_payments: vec![request.payment_type.code().to_string()],
            hide_blocks: vec![
                "ADDRESS_FORM".to_string(),
                "SHOP_INFO".to_string(),
                "LANGUAGE_MENU".to_string(),
                "HEADER".to_string(),
                "TARIFF".to_string(),
            ],
            skip_pages,
        },
        custom: Some(CustomSection {
            input1: Some("order_meta".to_string()),
            inputval1: Some(request.order_ref.clone()),
            lang: request.language.clone(),
            shop_invoked: None,
        }),
        instalment,
        cart_info,
    }
}

/// Starts a hosted-page payment: stores the purchase session and returns the
/// processor's redirect target.
pub async fn initiate_payment(
    ctx: &PaymentContext,
    config: &GatewayConfig,
    public_base_url: &str,
    request: &InitiationRequest,
) -> Result<InitiationOutcome, AppError> {
    let settings = config.method(request.payment_type);
    let action = if authorize_applies(&settings, request.payment_type, request.amount) {
        PaymentAction::Authorize
    } else {
        PaymentAction::Payment
    };

    let body = build_payment_request(config, public_base_url, request);
    let response = ctx.client.initiate(config, action, &body).await?;
    let redirect_url = response.redirect_url.clone().ok_or_else(|| {
        AppError::Internal("processor response is missing the redirect target".into())
    })?;

    ctx.store
        .put_session(PurchaseSession {
            order_ref: request.order_ref.clone(),
            user_id: request.user_id,
            product_id: request.product_id,
            customer_email: request.customer.email.clone(),
            payment_type: request.payment_type,
            amount: request.amount,
            currency: request.currency.clone(),
            created_at: Utc::now(),
        })
        .await?;

    Ok(InitiationOutcome {
        redirect_url,
        tid: response.transaction.and_then(|t| t.tid),
    })
}

//! Checkout endpoints: method listing and payment initiation.

use axum::extract::{Query, State};
use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::initiation::{self, CustomerProfile, InitiationRequest};
use crate::payment::eligibility::{eligible_methods, OrderContext};
use crate::payment::PaymentType;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MethodsQuery {
    pub amount: i64,
    pub currency: String,
    pub country: String,
    #[serde(default)]
    pub company: Option<String>,
    /// ISO date, `YYYY-MM-DD`.
    #[serde(default)]
    pub birth_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MethodsResponse {
    pub methods: Vec<String>,
}

/// Lists the payment methods this purchase may use, in display order.
pub async fn list_methods(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MethodsQuery>,
) -> Result<Json<MethodsResponse>, AppError> {
    let config = state.resolver.resolve("default").await?;
    let birth_date = query
        .birth_date
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest("birth_date must be YYYY-MM-DD".into()))
        })
        .transpose()?;

    let ctx = OrderContext {
        amount: query.amount,
        currency: query.currency,
        country: query.country,
        company: query.company,
        birth_date,
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    Ok(Json(MethodsResponse {
        methods: eligible_methods(&ctx, &config),
    }))
}

#[derive(Debug, Deserialize)]
pub struct InitiatePayload {
    pub order_ref: String,
    pub user_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub payment_type: String,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub redirect_url: String,
}

/// Starts a hosted-page payment and returns the redirect target.
pub async fn initiate(
    State(state): State<AppState>,
    Json(payload): Json<InitiatePayload>,
) -> Result<Json<InitiateResponse>, AppError> {
    let config = state.resolver.resolve("default").await?;

    let payment_type = PaymentType::from_code(&payload.payment_type)
        .filter(|ty| *ty != PaymentType::Unknown)
        .ok_or_else(|| {
            AppError::BadRequest(format!("unknown payment method {}", payload.payment_type))
        })?;
    if !config.method(payment_type).enabled {
        return Err(AppError::BadRequest(format!(
            "payment method {} is not enabled",
            payment_type.code()
        )));
    }
    if payload.amount <= 0 {
        return Err(AppError::BadRequest("amount must be positive".into()));
    }

    let request = InitiationRequest {
        order_ref: payload.order_ref,
        user_id: payload.user_id,
        product_id: payload.product_id,
        product_name: payload.product_name,
        payment_type,
        amount: payload.amount,
        currency: payload.currency,
        customer: CustomerProfile {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            customer_no: Some(payload.user_id.to_string()),
            street: payload.street,
            city: payload.city,
            zip: payload.zip,
            country: payload.country,
            company: payload.company,
            birth_date: payload.birth_date,
        },
        language: payload.language,
    };

    let outcome =
        initiation::initiate_payment(&state.ctx, &config, &state.public_base_url, &request)
            .await?;

    Ok(Json(InitiateResponse {
        redirect_url: outcome.redirect_url,
    }))
}

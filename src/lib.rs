pub mod checksum;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod fulfillment;
pub mod gateway;
pub mod handlers;
pub mod initiation;
pub mod instalment;
pub mod lifecycle;
pub mod notify;
pub mod payment;
pub mod return_flow;
pub mod settings;
pub mod store;
pub mod webhook;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::lifecycle::PaymentContext;
use crate::settings::ConfigResolver;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub ctx: PaymentContext,
    pub resolver: Arc<dyn ConfigResolver>,
    pub public_base_url: String,
    pub webhook_allowed_host: String,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments", post(handlers::pay::initiate))
        .route("/payments/methods", get(handlers::pay::list_methods))
        .route("/payments/return", get(handlers::return_flow::payment_return))
        .route("/webhooks/novalnet", post(handlers::webhook::callback))
        .route("/transactions/:tid", get(handlers::webhook::get_transaction))
        .with_state(state)
}

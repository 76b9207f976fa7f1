//! Webhook endpoint and transaction lookup.

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use std::net::SocketAddr;

use crate::db::models::TransactionRecord;
use crate::error::AppError;
use crate::webhook::{authenticate, WebhookProcessor, WebhookReply};
use crate::AppState;

/// Receives processor notifications. Always answers 200 with a message body;
/// rejected payloads explain themselves in the message.
pub async fn callback(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WebhookReply> {
    let client_ip = authenticate::client_ip(&headers, remote);
    let processor = WebhookProcessor {
        ctx: state.ctx.clone(),
        resolver: state.resolver.clone(),
        allowed_host: state.webhook_allowed_host.clone(),
    };
    Json(processor.process(client_ip, &body).await)
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(tid): Path<String>,
) -> Result<Json<TransactionRecord>, AppError> {
    let record = state
        .ctx
        .store
        .find_by_tid(&tid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {tid}")))?;
    Ok(Json(record))
}

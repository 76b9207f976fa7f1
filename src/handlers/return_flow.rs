//! Return endpoint for the redirect back from the hosted page.

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use crate::error::AppError;
use crate::notify::SyncDisposition;
use crate::return_flow::{self, ReturnOutcome, ReturnParams};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReturnResponse {
    pub disposition: SyncDisposition,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
}

/// Validates the redirect and reports where the checkout should send the
/// customer next.
pub async fn payment_return(
    State(state): State<AppState>,
    Query(params): Query<ReturnParams>,
) -> Result<Json<ReturnResponse>, AppError> {
    let config = state.resolver.resolve("default").await?;
    let outcome = return_flow::handle_return(&state.ctx, &config, &params).await?;

    let response = match outcome {
        ReturnOutcome::Completed {
            disposition,
            message,
            tid,
        } => ReturnResponse {
            disposition,
            message,
            tid: Some(tid),
        },
        ReturnOutcome::Failed { message } => ReturnResponse {
            disposition: SyncDisposition::Error,
            message,
            tid: None,
        },
    };
    Ok(Json(response))
}

pub mod pay;
pub mod return_flow;
pub mod webhook;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

use axum::extract::State;
use serde_json::{json, Value};

use super::AppState;
use crate::middleware::{ApiResponse, ApiResult};

/// GET / - service banner
pub async fn banner() -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "name": "Aqua API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Water intake tracking API",
        "endpoints": {
            "login": "POST /login",
            "users": "GET|POST /users",
            "user": "GET|PUT|DELETE /users/:id",
            "drink": "POST /users/:id/drink",
            "history": "GET /users/:id/history",
        }
    }))
}

/// GET /health - store connectivity check
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    state.connector.ping().await?;
    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "database": "ok"
    })))
}

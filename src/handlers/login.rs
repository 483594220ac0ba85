use axum::{body::Bytes, extract::State};
use serde_json::{Map, Value};
use tracing::info;

use super::{payload, AppState};
use crate::database::models::{encrypt_password, UsersModel};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::RequestMethod;
use crate::validation::{validate, FieldSpec, FieldType};

fn login_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("email", FieldType::Email).required().length(80),
        FieldSpec::new("password", FieldType::String).required().length(80),
    ]
}

/// POST /login - check credentials and return the user's profile
pub async fn login(State(state): State<AppState>, body: Bytes) -> ApiResult<Map<String, Value>> {
    let fields = validate(&login_fields(), RequestMethod::Post, &payload(&body)?)?;
    let email = fields.get_str("email").unwrap_or_default();
    let password = fields.get_str("password").unwrap_or_default();

    let mut db = state.builder().await?;
    let mut user = UsersModel::new(&mut db)
        .get_login(email)
        .await?
        .ok_or_else(ApiError::user_not_found)?;

    // Unknown e-mail and wrong password are indistinguishable to the client
    let stored = user.remove("password");
    if stored.as_ref().and_then(Value::as_str) != Some(encrypt_password(password).as_str()) {
        return Err(ApiError::user_not_found());
    }

    info!(email, "User logged in");
    Ok(ApiResponse::success(user))
}

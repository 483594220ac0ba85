use axum::{
    body::Bytes,
    extract::{Path, Query, State},
};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{payload, user_id, AppState};
use crate::database::models::{DrinkModel, UsersModel};
use crate::database::QueryBuilder;
use crate::error::ApiError;
use crate::filter::ListParams;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::RequestMethod;
use crate::validation::{validate, FieldSpec, FieldType};

type Row = Map<String, Value>;

fn user_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("email", FieldType::Email).required().length(80),
        FieldSpec::new("name", FieldType::String).required().length(80),
        FieldSpec::new("password", FieldType::String).required().length(80),
    ]
}

fn drink_fields() -> Vec<FieldSpec> {
    vec![FieldSpec::new("drink_ml", FieldType::Integer).required()]
}

async fn existing_user(db: &mut QueryBuilder, id: u64) -> Result<Row, ApiError> {
    UsersModel::new(db)
        .find_user(id)
        .await?
        .ok_or_else(ApiError::user_not_found)
}

/// GET /users - filtered, ordered and paged list with `X-Total-Count`
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Vec<Row>> {
    let params = ListParams::from_pairs(query)?;
    let mut db = state.builder().await?;
    let mut users = UsersModel::new(&mut db);

    let total = users.count_users(&params).await?;
    let rows = users.get_users(&Value::Null, &params).await?;

    Ok(ApiResponse::success(rows).header("x-total-count", total))
}

/// GET /users/:id
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Row> {
    let id = user_id(&id)?;
    let mut db = state.builder().await?;
    Ok(ApiResponse::success(existing_user(&mut db, id).await?))
}

/// POST /users - register a user
pub async fn create_user(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let fields = validate(&user_fields(), RequestMethod::Post, &payload(&body)?)?;
    let email = fields.get_str("email").unwrap_or_default();
    let name = fields.get_str("name").unwrap_or_default();
    let password = fields.get_str("password").unwrap_or_default();

    let mut db = state.builder().await?;
    let mut users = UsersModel::new(&mut db);

    if users.email_in_use(email, None).await? {
        return Err(ApiError::conflict("UserAlreadyExists", "A user is already registered with this e-mail"));
    }

    let id = users.insert_user(email, name, password).await?;
    info!(id, email, "Created user");

    Ok(ApiResponse::created(json!({
        "iduser": id,
        "email": email,
        "name": name,
    })))
}

/// PUT /users/:id - partial update; also re-activates the user
pub async fn update_user(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> ApiResult<()> {
    let id = user_id(&id)?;
    let fields = validate(&user_fields(), RequestMethod::Put, &payload(&body)?)?;

    let mut db = state.builder().await?;
    existing_user(&mut db, id).await?;
    let mut users = UsersModel::new(&mut db);

    if let Some(email) = fields.get_str("email") {
        if users.email_in_use(email, Some(id)).await? {
            return Err(ApiError::conflict("EmailUnavailable", "This e-mail is already used by another user"));
        }
    }

    users
        .update_user(id, fields.get_str("email"), fields.get_str("name"), fields.get_str("password"))
        .await?;

    Ok(ApiResponse::no_content())
}

/// DELETE /users/:id - deactivate
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let id = user_id(&id)?;
    let mut db = state.builder().await?;
    existing_user(&mut db, id).await?;

    UsersModel::new(&mut db).deactivate_user(id).await?;
    info!(id, "Deactivated user");

    Ok(ApiResponse::no_content())
}

/// POST /users/:id/drink - record a drink and return the refreshed user
pub async fn drink_water(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> ApiResult<Row> {
    let id = user_id(&id)?;
    let fields = validate(&drink_fields(), RequestMethod::Post, &payload(&body)?)?;
    let drink_ml = fields
        .get_i64("drink_ml")
        .ok_or_else(|| ApiError::bad_request("InvalidParameters", "drink_ml must be an integer"))?;

    let mut db = state.builder().await?;
    if !UsersModel::new(&mut db).user_is_active(id).await? {
        return Err(ApiError::user_not_found());
    }

    db.begin_transaction().await?;
    let inserted = DrinkModel::new(&mut db).drink_water(id, drink_ml).await;
    match inserted {
        Ok(_) => db.commit().await?,
        Err(err) => {
            if let Err(rollback) = db.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            return Err(err.into());
        }
    }

    Ok(ApiResponse::success(existing_user(&mut db, id).await?))
}

/// GET /users/:id/history - the user's drinks, newest first
pub async fn drink_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Vec<Row>> {
    let id = user_id(&id)?;
    let params = ListParams::from_pairs(query)?;

    let mut db = state.builder().await?;
    existing_user(&mut db, id).await?;
    let rows = DrinkModel::new(&mut db).history(id, &params).await?;

    Ok(ApiResponse::success(rows))
}

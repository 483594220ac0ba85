// handlers/mod.rs - HTTP surface
//
// One QueryBuilder per request: each handler acquires its own store handle
// from the shared connector and releases it when the request completes.
pub mod login;
pub mod root;
pub mod users;

use axum::{
    body::Bytes,
    routing::{get, post},
    Router,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::config;
use crate::database::{Connector, QueryBuilder};
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn Connector>,
}

impl AppState {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self { connector: Arc::new(connector) }
    }

    /// A fresh builder over a newly acquired store handle
    pub async fn builder(&self) -> Result<QueryBuilder, ApiError> {
        let store = self.connector.acquire().await?;
        Ok(QueryBuilder::new(store))
    }
}

pub fn router(state: AppState) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(root::banner))
        .route("/health", get(root::health))
        .route("/login", post(login::login))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/drink", post(users::drink_water))
        .route("/users/:id/history", get(users::drink_history))
        .with_state(state);

    if config().api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Request body as a JSON object; an empty body is an empty object.
pub(crate) fn payload(body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::bad_request("InvalidJson", "Request body must be a JSON object")),
        Err(e) => Err(ApiError::bad_request("InvalidJson", format!("Invalid JSON body: {}", e))),
    }
}

/// Numeric user id from the path; anything else names no user.
pub(crate) fn user_id(raw: &str) -> Result<u64, ApiError> {
    raw.trim().parse::<u64>().map_err(|_| ApiError::user_not_found())
}

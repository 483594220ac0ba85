// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::config::config;
use crate::database::{DatabaseError, QueryError, StoreError};
use crate::filter::FilterError;
use crate::validation::{ErrorSet, ValidationError};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest { tag: &'static str, message: String },
    InvalidParameters(ErrorSet),
    UnsupportedOperator(String),

    // 404 Not Found
    NotFound { tag: &'static str, message: String },

    // 409 Conflict
    Conflict { tag: &'static str, message: String },

    // 500 Internal Server Error
    QueryError { statement: Option<String>, message: String, code: Option<String> },
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::InvalidParameters(_) => 400,
            ApiError::UnsupportedOperator(_) => 400,
            ApiError::NotFound { .. } => 404,
            ApiError::Conflict { .. } => 409,
            ApiError::QueryError { .. } => 500,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { tag, .. } => *tag,
            ApiError::InvalidParameters(_) => "InvalidParameters",
            ApiError::UnsupportedOperator(_) => "UnsupportedOperator",
            ApiError::NotFound { tag, .. } => *tag,
            ApiError::Conflict { tag, .. } => *tag,
            ApiError::QueryError { .. } => "QueryError",
            ApiError::InternalServerError(_) => "InternalServerError",
            ApiError::ServiceUnavailable(_) => "DatabaseUnavailable",
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest { message, .. } => message.clone(),
            ApiError::InvalidParameters(_) => "There are errors in the submitted fields".to_string(),
            ApiError::UnsupportedOperator(op) => format!("Unsupported operator: {}", op),
            ApiError::NotFound { message, .. } => message.clone(),
            ApiError::Conflict { message, .. } => message.clone(),
            ApiError::QueryError { .. } => "An error occurred while processing your request".to_string(),
            ApiError::InternalServerError(message) => message.clone(),
            ApiError::ServiceUnavailable(message) => message.clone(),
        }
    }

    /// Structured detail; store diagnostics only when `debug_errors` is on
    pub fn details(&self) -> Option<Value> {
        match self {
            ApiError::InvalidParameters(errors) => Some(json!(errors)),
            ApiError::QueryError { statement, message, code } if config().api.debug_errors => Some(json!({
                "statement": statement,
                "message": message,
                "code": code,
            })),
            _ => None,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "success": false,
            "error": self.error_code(),
            "message": self.message(),
        });

        if let Some(details) = self.details() {
            response["details"] = details;
        }

        response
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(tag: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest { tag, message: message.into() }
    }

    pub fn not_found(tag: &'static str, message: impl Into<String>) -> Self {
        ApiError::NotFound { tag, message: message.into() }
    }

    pub fn conflict(tag: &'static str, message: impl Into<String>) -> Self {
        ApiError::Conflict { tag, message: message.into() }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    pub fn user_not_found() -> Self {
        ApiError::not_found("UserNotFound", "User not found")
    }
}

// Convert other error types to ApiError
impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::UnsupportedOperator(op) => ApiError::UnsupportedOperator(op),
            other => ApiError::bad_request("InvalidFilter", other.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidParameters(errors) => ApiError::InvalidParameters(errors),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Filter(filter) => filter.into(),
            QueryError::MissingClause(clause) => {
                tracing::error!("Statement compiled without its {} clause", clause);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            QueryError::Statement { statement, code, message } => ApiError::QueryError {
                statement: Some(statement),
                message,
                code,
            },
            QueryError::Unavailable { message, .. } => {
                tracing::error!("Store unavailable: {}", message);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(message) => {
                tracing::error!("Store unavailable: {}", message);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            StoreError::Rejected { code, message } => ApiError::QueryError { statement: None, message, code },
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Sqlx(sqlx_err) => StoreError::from(sqlx_err).into(),
            other => {
                // Log the real error but return generic message
                tracing::error!("Database configuration error: {}", other);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

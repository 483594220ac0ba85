#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use aqua_api::database::{ColumnMeta, ColumnType, Connector, Store, StoreError, StoreResult};
use aqua_api::filter::SqlFragment;
use aqua_api::handlers::{router, AppState};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<StoreResult, StoreError>>,
    statements: Vec<String>,
    acquire_error: Option<StoreError>,
}

/// Connector whose stores replay queued results and record inline SQL.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, columns: &[(&str, ColumnType)], rows: Vec<Vec<Option<&str>>>) -> &Self {
        let columns = columns
            .iter()
            .map(|(name, column_type)| ColumnMeta { name: name.to_string(), column_type: *column_type })
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|cell| cell.map(str::to_string)).collect())
            .collect();
        self.push(Ok(StoreResult::with_rows(columns, rows)))
    }

    pub fn affected(&self, affected_rows: u64, last_insert_id: u64) -> &Self {
        self.push(Ok(StoreResult::with_affected(affected_rows, last_insert_id)))
    }

    pub fn error(&self, err: StoreError) -> &Self {
        self.push(Err(err))
    }

    pub fn refuse_connections(&self, message: &str) {
        self.script.lock().unwrap().acquire_error = Some(StoreError::Connection(message.to_string()));
    }

    fn push(&self, response: Result<StoreResult, StoreError>) -> &Self {
        self.script.lock().unwrap().responses.push_back(response);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.script.lock().unwrap().statements.clone()
    }

    pub fn app(&self) -> Router {
        router(AppState::new(self.clone()))
    }
}

struct ScriptedStore {
    script: Arc<Mutex<Script>>,
}

impl ScriptedStore {
    fn command(&self, command: &str) -> Result<(), StoreError> {
        self.script.lock().unwrap().statements.push(command.to_string());
        Ok(())
    }
}

#[async_trait]
impl Store for ScriptedStore {
    async fn execute(&mut self, statement: &SqlFragment) -> Result<StoreResult, StoreError> {
        let mut script = self.script.lock().unwrap();
        script.statements.push(statement.to_inline_sql());
        script.responses.pop_front().unwrap_or_else(|| Ok(StoreResult::default()))
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        self.command("START TRANSACTION")
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.command("COMMIT")
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.command("ROLLBACK")
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn acquire(&self) -> Result<Box<dyn Store>, StoreError> {
        if let Some(err) = self.script.lock().unwrap().acquire_error.clone() {
            return Err(err);
        }
        Ok(Box::new(ScriptedStore { script: self.script.clone() }))
    }
}

pub const USER_COLUMNS: &[(&str, ColumnType)] = &[
    ("iduser", ColumnType::Long),
    ("email", ColumnType::Text),
    ("name", ColumnType::Text),
    ("active", ColumnType::Tiny),
    ("drink_counter", ColumnType::LongLong),
];

/// Queues one user row as returned by the users listing query.
pub fn user_row(connector: &ScriptedConnector, id: &str, email: &str, active: &str, drinks: &str) {
    connector.rows(USER_COLUMNS, vec![vec![Some(id), Some(email), Some("Ana"), Some(active), Some(drinks)]]);
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

pub async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> Result<TestResponse> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(json) => Body::from(serde_json::to_vec(&json)?),
            None => Body::empty(),
        })?;

    let response = app.oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };

    Ok(TestResponse { status, headers, body })
}

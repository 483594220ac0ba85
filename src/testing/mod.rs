//! In-memory store for unit tests: replays queued results and records every
//! statement it receives as inline SQL.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::database::decoder::ColumnType;
use crate::database::store::{ColumnMeta, Store, StoreError, StoreResult};
use crate::filter::SqlFragment;

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<StoreResult, StoreError>>,
    statements: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedStore {
    script: Arc<Mutex<Script>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn Store> {
        Box::new(self.clone())
    }

    pub fn push_rows(&self, columns: &[(&str, ColumnType)], rows: Vec<Vec<Option<&str>>>) -> &Self {
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

    pub fn push_affected(&self, affected_rows: u64, last_insert_id: u64) -> &Self {
        self.push(Ok(StoreResult::with_affected(affected_rows, last_insert_id)))
    }

    pub fn push_error(&self, err: StoreError) -> &Self {
        self.push(Err(err))
    }

    fn push(&self, response: Result<StoreResult, StoreError>) -> &Self {
        self.script.lock().unwrap().responses.push_back(response);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.script.lock().unwrap().statements.clone()
    }

    fn record(&self, statement: String) -> Result<StoreResult, StoreError> {
        let mut script = self.script.lock().unwrap();
        script.statements.push(statement);
        script.responses.pop_front().unwrap_or_else(|| Ok(StoreResult::default()))
    }

    // Transaction control is logged but never consumes a queued response
    fn record_command(&self, command: &str) -> Result<(), StoreError> {
        self.script.lock().unwrap().statements.push(command.to_string());
        Ok(())
    }
}

#[async_trait]
impl Store for ScriptedStore {
    async fn execute(&mut self, statement: &SqlFragment) -> Result<StoreResult, StoreError> {
        self.record(statement.to_inline_sql())
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        self.record_command("START TRANSACTION")
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.record_command("COMMIT")
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.record_command("ROLLBACK")
    }
}

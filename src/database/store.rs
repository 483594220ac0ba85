//! Store channel: executes statements and hands back text cells plus column types.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Column, Either, Executor, Row, TypeInfo};
use thiserror::Error;

use super::decoder::ColumnType;
use crate::filter::{SqlFragment, SqlValue};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
}

/// Raw outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Option<String>>>,
    pub affected_rows: u64,
    pub last_insert_id: u64,
}

impl StoreResult {
    pub fn with_rows(columns: Vec<ColumnMeta>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows, ..Default::default() }
    }

    pub fn with_affected(affected_rows: u64, last_insert_id: u64) -> Self {
        Self { affected_rows, last_insert_id, ..Default::default() }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The store could not be reached or the connection broke.
    #[error("Store unavailable: {0}")]
    Connection(String),

    /// The store received the statement and refused it.
    #[error("{message}")]
    Rejected { code: Option<String>, message: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => StoreError::Rejected {
                code: db.code().map(|c| c.to_string()),
                message: db.message().to_string(),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
            other => StoreError::Rejected { code: None, message: other.to_string() },
        }
    }
}

/// One connection's worth of statement execution.
#[async_trait]
pub trait Store: Send {
    async fn execute(&mut self, statement: &SqlFragment) -> Result<StoreResult, StoreError>;
    async fn begin(&mut self) -> Result<(), StoreError>;
    async fn commit(&mut self) -> Result<(), StoreError>;
    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Hands out store handles; each handle is released when dropped.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Store>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        let mut store = self.acquire().await?;
        store.execute(&SqlFragment::sql("SELECT 1")).await?;
        Ok(())
    }
}

pub struct MySqlStore {
    conn: PoolConnection<MySql>,
}

impl MySqlStore {
    pub fn new(conn: PoolConnection<MySql>) -> Self {
        Self { conn }
    }

    async fn run_command(&mut self, command: &str) -> Result<(), StoreError> {
        // Plain text protocol; transaction control is not preparable everywhere
        (&mut *self.conn).execute(command).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn execute(&mut self, statement: &SqlFragment) -> Result<StoreResult, StoreError> {
        let sql = statement.query();
        let mut q = sqlx::query(&sql);
        for p in statement.params() {
            q = bind_param(q, p);
        }

        let mut result = StoreResult::default();
        let mut stream = (&mut *self.conn).fetch_many(q);
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => {
                    result.affected_rows += done.rows_affected();
                    if done.last_insert_id() != 0 {
                        result.last_insert_id = done.last_insert_id();
                    }
                }
                Either::Right(row) => {
                    if result.columns.is_empty() {
                        result.columns = column_meta(&row);
                    }
                    let cells = (0..row.len())
                        .map(|i| {
                            let column_type = result.columns.get(i).map(|c| c.column_type).unwrap_or(ColumnType::Text);
                            cell_text(&row, i, column_type)
                        })
                        .collect();
                    result.rows.push(cells);
                }
            }
        }

        Ok(result)
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        self.run_command("START TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.run_command("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.run_command("ROLLBACK").await
    }
}

#[derive(Clone)]
pub struct MySqlConnector {
    pool: MySqlPool,
}

impl MySqlConnector {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn acquire(&self) -> Result<Box<dyn Store>, StoreError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(MySqlStore::new(conn)))
    }
}

fn column_meta(row: &MySqlRow) -> Vec<ColumnMeta> {
    row.columns()
        .iter()
        .map(|c| ColumnMeta {
            name: c.name().to_string(),
            column_type: ColumnType::from_type_name(c.type_info().name()),
        })
        .collect()
}

// Renders one cell as text through the column's reported type.
fn cell_text(row: &MySqlRow, i: usize, column_type: ColumnType) -> Option<String> {
    match column_type {
        ColumnType::Tiny | ColumnType::Short | ColumnType::Long | ColumnType::Int24 | ColumnType::LongLong => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                return v.map(|n| n.to_string());
            }
            if let Ok(v) = row.try_get::<Option<u64>, _>(i) {
                return v.map(|n| n.to_string());
            }
            if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
                return v.map(|b| if b { "1".to_string() } else { "0".to_string() });
            }
        }
        ColumnType::Float | ColumnType::Double => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
                return v.map(|n| n.to_string());
            }
            if let Ok(v) = row.try_get::<Option<f32>, _>(i) {
                return v.map(|n| n.to_string());
            }
        }
        ColumnType::Decimal => {
            if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(i) {
                return v.map(|d| d.to_string());
            }
        }
        ColumnType::Timestamp | ColumnType::DateTime => {
            if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
                return v.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
            }
            if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
                return v.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
            }
        }
        ColumnType::Text => {}
    }

    // Text columns, and anything the typed reads above could not decode
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        v
    } else if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(i) {
        v.map(|d| d.format("%Y-%m-%d").to_string())
    } else if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(i) {
        v.map(|t| t.format("%H:%M:%S").to_string())
    } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    } else {
        None
    }
}

fn bind_param<'q>(q: Query<'q, MySql, MySqlArguments>, v: &SqlValue) -> Query<'q, MySql, MySqlArguments> {
    match v {
        SqlValue::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        SqlValue::Bool(b) => q.bind(*b),
        SqlValue::Int(i) => q.bind(*i),
        SqlValue::UInt(u) => q.bind(*u),
        SqlValue::Float(f) => q.bind(*f),
        SqlValue::Text(s) => q.bind(s.clone()),
    }
}

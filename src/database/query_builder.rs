use serde_json::{Map, Value};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::decoder::{self, TinyIntPolicy};
use super::store::{Store, StoreError, StoreResult};
use crate::config::config;
use crate::filter::escape;
use crate::filter::{FilterError, FilterOrder, FilterOrderInfo, FilterWhere, OrderEntry, SqlFragment, SqlValue};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Statement is missing its {0} clause")]
    MissingClause(&'static str),

    /// The store refused a compiled statement.
    #[error("Statement failed: {message}")]
    Statement { statement: String, code: Option<String>, message: String },

    #[error("Store unavailable: {message}")]
    Unavailable { statement: String, message: String },
}

impl QueryError {
    fn from_store(statement: String, err: StoreError) -> Self {
        match err {
            StoreError::Rejected { code, message } => QueryError::Statement { statement, code, message },
            StoreError::Connection(message) => QueryError::Unavailable { statement, message },
        }
    }

    /// Inline statement text, when the error came from execution.
    pub fn statement(&self) -> Option<&str> {
        match self {
            QueryError::Statement { statement, .. } | QueryError::Unavailable { statement, .. } => Some(statement),
            _ => None,
        }
    }
}

/// One or many clause expressions: `"a"`, `vec!["a", "b"]`, `["a", "b"]`.
pub trait ClauseList {
    fn into_clauses(self) -> Vec<String>;
}

impl ClauseList for &str {
    fn into_clauses(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl ClauseList for String {
    fn into_clauses(self) -> Vec<String> {
        vec![self]
    }
}

impl<T: Into<String>> ClauseList for Vec<T> {
    fn into_clauses(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<String> + Clone> ClauseList for &[T] {
    fn into_clauses(self) -> Vec<String> {
        self.iter().cloned().map(Into::into).collect()
    }
}

impl<T: Into<String>, const N: usize> ClauseList for [T; N] {
    fn into_clauses(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

// Everything one statement accumulates; taken wholesale after each execution.
#[derive(Debug, Default)]
struct StatementState {
    table: String,
    fields: Vec<String>,
    joins: Vec<String>,
    filters: Vec<SqlFragment>,
    sets: Vec<(String, SqlFragment)>,
    group_by: Vec<String>,
    order_by: Vec<OrderEntry>,
    limit: Option<(u64, u64)>,
}

/// Stateful statement builder bound to one store handle.
///
/// Clause calls accumulate until a statement executes; the state is cleared
/// before the outcome is inspected, so the next statement always starts empty.
pub struct QueryBuilder {
    store: Box<dyn Store>,
    state: StatementState,
    result: StoreResult,
    in_transaction: bool,
    tinyint_policy: TinyIntPolicy,
}

impl QueryBuilder {
    pub fn new(store: Box<dyn Store>) -> Self {
        Self {
            store,
            state: StatementState::default(),
            result: StoreResult::default(),
            in_transaction: false,
            tinyint_policy: config().query.tinyint_policy,
        }
    }

    pub fn with_tinyint_policy(mut self, policy: TinyIntPolicy) -> Self {
        self.tinyint_policy = policy;
        self
    }

    pub fn select(&mut self, fields: impl ClauseList) -> &mut Self {
        self.state.fields.extend(fields.into_clauses().into_iter().filter(|f| !f.trim().is_empty()));
        self
    }

    pub fn from(&mut self, table: &str) -> Result<&mut Self, FilterError> {
        self.state.table = escape::validate_identifier(table)?.to_string();
        Ok(self)
    }

    pub fn join(&mut self, table: &str, on: &str, left: bool) -> Result<&mut Self, FilterError> {
        let table = escape::validate_identifier(table)?;
        let kind = if left { "LEFT JOIN" } else { "JOIN" };
        self.state.joins.push(format!("{} {} ON {}", kind, table, on.trim()));
        Ok(self)
    }

    /// Adds predicates; see [`FilterWhere`] for the accepted shapes.
    pub fn filter(&mut self, conditions: &Value) -> Result<&mut Self, FilterError> {
        let predicates = FilterWhere::generate(conditions)?;
        if config().query.debug_logging && !predicates.is_empty() {
            debug!(conditions = %conditions, predicates = predicates.len(), "Generated filter predicates");
        }
        self.state.filters.extend(predicates);
        Ok(self)
    }

    /// Column assignments for INSERT/UPDATE. A repeated column keeps the latest value.
    pub fn set(&mut self, values: &Map<String, Value>) -> Result<&mut Self, FilterError> {
        for (field, value) in values {
            let column = escape::validate_identifier(field)?.to_string();
            let rhs = Self::set_value(value);
            match self.state.sets.iter_mut().find(|(existing, _)| *existing == column) {
                Some(entry) => entry.1 = rhs,
                None => self.state.sets.push((column, rhs)),
            }
        }
        Ok(self)
    }

    fn set_value(value: &Value) -> SqlFragment {
        match value {
            Value::String(s) => match escape::keyword(s) {
                Some(keyword) => SqlFragment::sql(keyword),
                None => {
                    let mut rhs = SqlFragment::new();
                    rhs.push_param(SqlValue::Text(s.clone()));
                    rhs
                }
            },
            Value::Null => SqlFragment::sql("NULL"),
            other => {
                let mut rhs = SqlFragment::new();
                rhs.push_param(SqlValue::from(other));
                rhs
            }
        }
    }

    pub fn group_by(&mut self, fields: impl ClauseList) -> &mut Self {
        self.state.group_by.extend(fields.into_clauses().into_iter().filter(|f| !f.trim().is_empty()));
        self
    }

    /// Verbatim ORDER BY expressions, appended in call order.
    pub fn order_by(&mut self, exprs: impl ClauseList) -> &mut Self {
        for expr in exprs.into_clauses() {
            if !expr.trim().is_empty() {
                self.state.order_by.push(OrderEntry::Raw(expr.trim().to_string()));
            }
        }
        self
    }

    /// Column orderings; ordering the same column twice keeps the latest direction.
    pub fn order_by_fields(&mut self, orders: &[FilterOrderInfo]) -> Result<&mut Self, FilterError> {
        for info in orders {
            let column = escape::validate_identifier(&info.column)?;
            let entry = FilterOrderInfo::new(column, info.sort);
            let existing = self.state.order_by.iter_mut().find(|e| matches!(e, OrderEntry::Column(c) if c.column == entry.column));
            match existing {
                Some(slot) => *slot = OrderEntry::Column(entry),
                None => self.state.order_by.push(OrderEntry::Column(entry)),
            }
        }
        Ok(self)
    }

    pub fn limit(&mut self, offset: u64, count: u64) -> &mut Self {
        let max_limit = config().query.max_limit.unwrap_or(u64::MAX);
        let applied = if count > max_limit {
            warn!("Limit {} exceeds max {}, capping to max", count, max_limit);
            max_limit
        } else {
            count
        };
        self.state.limit = Some((offset, applied));
        self
    }

    pub fn compile_select(&self) -> SqlFragment {
        let state = &self.state;
        let mut statement = SqlFragment::sql("SELECT ");
        if state.fields.is_empty() {
            statement.push_sql("*");
        } else {
            statement.push_sql(state.fields.join(", "));
        }
        statement.push_sql(" FROM");
        if !state.table.is_empty() {
            statement.push_sql(format!(" {}", state.table));
        }
        for join in &state.joins {
            statement.push_sql(format!(" {}", join));
        }
        self.push_where(&mut statement);
        if !state.group_by.is_empty() {
            statement.push_sql(format!(" GROUP BY {}", state.group_by.join(", ")));
        }
        let order = FilterOrder::generate(&state.order_by);
        if !order.is_empty() {
            statement.push_sql(format!(" {}", order));
        }
        if let Some((offset, count)) = state.limit {
            statement.push_sql(format!(" LIMIT {},{}", offset, count));
        }
        statement
    }

    pub fn compile_insert(&self) -> Result<SqlFragment, QueryError> {
        let mut statement = SqlFragment::sql(format!("INSERT INTO {} SET ", self.target()?));
        statement.append(self.assignments()?);
        Ok(statement)
    }

    pub fn compile_update(&self) -> Result<SqlFragment, QueryError> {
        let mut statement = SqlFragment::sql(format!("UPDATE {} SET ", self.target()?));
        statement.append(self.assignments()?);
        self.push_where(&mut statement);
        Ok(statement)
    }

    fn target(&self) -> Result<&str, QueryError> {
        if self.state.table.is_empty() {
            return Err(QueryError::MissingClause("table"));
        }
        Ok(&self.state.table)
    }

    fn assignments(&self) -> Result<SqlFragment, QueryError> {
        if self.state.sets.is_empty() {
            return Err(QueryError::MissingClause("SET"));
        }
        let parts = self.state.sets.iter().map(|(column, rhs)| {
            let mut assignment = SqlFragment::sql(format!("{} = ", column));
            assignment.append(rhs.clone());
            assignment
        });
        Ok(SqlFragment::join(parts, ", "))
    }

    fn push_where(&self, statement: &mut SqlFragment) {
        if self.state.filters.is_empty() {
            return;
        }
        statement.push_sql(" WHERE ");
        statement.append(SqlFragment::join(self.state.filters.iter().cloned(), " AND "));
    }

    pub fn clear(&mut self) {
        self.state = StatementState::default();
    }

    /// Runs the accumulated SELECT and returns the decoded rows.
    pub async fn get(&mut self) -> Result<Vec<Map<String, Value>>, QueryError> {
        let statement = self.compile_select();
        self.execute(statement).await?;
        Ok(self.rows())
    }

    /// Runs the accumulated INSERT and returns the generated id.
    pub async fn insert(&mut self) -> Result<u64, QueryError> {
        let compiled = self.compile_insert();
        self.clear();
        self.execute(compiled?).await?;
        Ok(self.result.last_insert_id)
    }

    /// Runs the accumulated UPDATE and returns the affected row count.
    pub async fn update(&mut self) -> Result<u64, QueryError> {
        let compiled = self.compile_update();
        self.clear();
        self.execute(compiled?).await?;
        Ok(self.result.affected_rows)
    }

    /// Runs a hand-written statement; builder clauses are discarded.
    pub async fn query(&mut self, statement: impl Into<SqlFragment>) -> Result<(), QueryError> {
        self.execute(statement.into()).await
    }

    async fn execute(&mut self, statement: SqlFragment) -> Result<(), QueryError> {
        self.clear();
        self.result = StoreResult::default();

        let started = Instant::now();
        let outcome = self.store.execute(&statement).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.log_statement(&statement, elapsed_ms);

        match outcome {
            Ok(result) => {
                self.result = result;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, sql = %statement, "Statement failed");
                Err(QueryError::from_store(statement.to_inline_sql(), err))
            }
        }
    }

    fn log_statement(&self, statement: &SqlFragment, elapsed_ms: u64) {
        let db = &config().database;
        if db.enable_query_logging {
            debug!(sql = %statement, elapsed_ms, "Executed statement");
        }
        if db.enable_slow_query_warning && elapsed_ms >= db.slow_query_threshold_ms {
            warn!(sql = %statement, elapsed_ms, "Slow statement");
        }
    }

    pub fn row_count(&self) -> usize {
        self.result.row_count()
    }

    pub fn affected_rows(&self) -> u64 {
        self.result.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.result.last_insert_id
    }

    /// Rows of the last statement, decoded per column type.
    pub fn rows(&self) -> Vec<Map<String, Value>> {
        if self.result.row_count() == 0 {
            return vec![];
        }
        decoder::decode(&self.result.columns, &self.result.rows, self.tinyint_policy)
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub async fn begin_transaction(&mut self) -> Result<(), QueryError> {
        self.store
            .begin()
            .await
            .map_err(|e| QueryError::from_store("START TRANSACTION".to_string(), e))?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), QueryError> {
        self.in_transaction = false;
        self.store.commit().await.map_err(|e| QueryError::from_store("COMMIT".to_string(), e))
    }

    pub async fn rollback(&mut self) -> Result<(), QueryError> {
        self.in_transaction = false;
        self.store.rollback().await.map_err(|e| QueryError::from_store("ROLLBACK".to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::decoder::ColumnType;
    use crate::filter::SortDirection;
    use crate::testing::ScriptedStore;
    use serde_json::json;

    fn builder(store: &ScriptedStore) -> QueryBuilder {
        QueryBuilder::new(store.boxed())
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn bare_select() {
        let store = ScriptedStore::new();
        let mut qb = builder(&store);
        qb.from("user").unwrap();
        assert_eq!(qb.compile_select().to_inline_sql(), "SELECT * FROM user");
    }

    #[test]
    fn full_select_in_clause_order() {
        let store = ScriptedStore::new();
        let mut qb = builder(&store);
        qb.select(["user.id_user", "user.name"])
            .select("count(drink.id_drink) AS drink_counter");
        qb.from("user").unwrap();
        qb.join("drink", "drink.id_user = user.id_user", true).unwrap();
        qb.filter(&json!({"user.email": {"lk": "gmail"}, "user.active": true})).unwrap();
        qb.group_by("user.id_user");
        qb.order_by_fields(&[FilterOrderInfo::new("user.name", SortDirection::Desc)]).unwrap();
        qb.limit(20, 10);

        let statement = qb.compile_select();
        assert_eq!(
            statement.query(),
            "SELECT user.id_user, user.name, count(drink.id_drink) AS drink_counter FROM user \
             LEFT JOIN drink ON drink.id_user = user.id_user \
             WHERE user.email LIKE ? AND user.active = ? \
             GROUP BY user.id_user ORDER BY user.name DESC LIMIT 20,10"
        );
        assert_eq!(statement.params(), vec![&SqlValue::Text("%gmail%".into()), &SqlValue::Bool(true)]);
    }

    #[test]
    fn bracket_filter_renders_quoted_literal() {
        let store = ScriptedStore::new();
        let mut qb = builder(&store);
        qb.from("user").unwrap();
        qb.filter(&json!({"age": {"gt": "10"}})).unwrap();
        assert_eq!(qb.compile_select().to_inline_sql(), "SELECT * FROM user WHERE age > '10'");

        assert_eq!(
            qb.filter(&json!({"age": {"zzz": "10"}})).err(),
            Some(FilterError::UnsupportedOperator("zzz".to_string()))
        );
    }

    #[test]
    fn order_map_replaces_same_column() {
        let store = ScriptedStore::new();
        let mut qb = builder(&store);
        qb.from("drink").unwrap();
        qb.order_by_fields(&[
            FilterOrderInfo::new("drink_at", SortDirection::Asc),
            FilterOrderInfo::new("id_drink", SortDirection::Asc),
            FilterOrderInfo::new("drink_at", SortDirection::Desc),
        ])
        .unwrap();
        assert_eq!(
            qb.compile_select().query(),
            "SELECT * FROM drink ORDER BY drink_at DESC, id_drink ASC"
        );
    }

    #[test]
    fn insert_and_update_statements() {
        let store = ScriptedStore::new();
        let mut qb = builder(&store);
        qb.from("drink").unwrap();
        qb.set(&map(json!({"id_user": 4, "drink_ml": 250, "drink_at": "now()"}))).unwrap();
        assert_eq!(
            qb.compile_insert().unwrap().to_inline_sql(),
            "INSERT INTO drink SET id_user = 4, drink_ml = 250, drink_at = now()"
        );

        qb.clear();
        qb.from("user").unwrap();
        qb.set(&map(json!({"name": "O'Neil", "active": true, "email": null}))).unwrap();
        qb.filter(&json!({"id_user": 4})).unwrap();
        assert_eq!(
            qb.compile_update().unwrap().to_inline_sql(),
            "UPDATE user SET name = 'O\\'Neil', active = true, email = NULL WHERE id_user = 4"
        );
    }

    #[test]
    fn writes_need_table_and_assignments() {
        let store = ScriptedStore::new();
        let mut qb = builder(&store);
        assert_eq!(qb.compile_insert(), Err(QueryError::MissingClause("table")));
        qb.from("user").unwrap();
        assert_eq!(qb.compile_update(), Err(QueryError::MissingClause("SET")));
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let store = ScriptedStore::new();
        let mut qb = builder(&store);
        assert!(qb.from("user; DROP TABLE user").is_err());
        assert!(qb.set(&map(json!({"name = 1 --": "x"}))).is_err());
    }

    #[tokio::test]
    async fn state_is_cleared_after_execution() {
        let store = ScriptedStore::new();
        store.push_rows(
            &[("id_user", ColumnType::Long), ("active", ColumnType::Tiny)],
            vec![vec![Some("1"), Some("1")], vec![Some("2"), Some("0")]],
        );
        let mut qb = builder(&store);
        qb.from("user").unwrap();
        qb.filter(&json!({"active": true})).unwrap();
        qb.limit(0, 10);

        let rows = qb.get().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(qb.row_count(), 2);
        assert_eq!(Value::Object(rows[1].clone()), json!({"id_user": 2, "active": false}));
        assert_eq!(store.statements(), vec!["SELECT * FROM user WHERE active = true LIMIT 0,10"]);

        assert_eq!(qb.compile_select().to_inline_sql(), "SELECT * FROM");
    }

    #[tokio::test]
    async fn store_rejection_becomes_query_error() {
        let store = ScriptedStore::new();
        store.push_error(StoreError::Rejected { code: Some("1062".into()), message: "Duplicate entry".into() });
        let mut qb = builder(&store);
        qb.from("user").unwrap();
        qb.set(&map(json!({"email": "a@b.com"}))).unwrap();

        let err = qb.insert().await.unwrap_err();
        assert_eq!(
            err,
            QueryError::Statement {
                statement: "INSERT INTO user SET email = 'a@b.com'".into(),
                code: Some("1062".into()),
                message: "Duplicate entry".into(),
            }
        );
        // cleared even though the statement failed
        assert_eq!(qb.compile_select().query(), "SELECT * FROM");
    }

    #[tokio::test]
    async fn connection_failure_is_unavailable() {
        let store = ScriptedStore::new();
        store.push_error(StoreError::Connection("broken pipe".into()));
        let mut qb = builder(&store);
        let err = qb.query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, QueryError::Unavailable { .. }));
        assert_eq!(err.statement(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn write_results_and_transactions() {
        let store = ScriptedStore::new();
        store.push_affected(1, 42);
        let mut qb = builder(&store);

        qb.begin_transaction().await.unwrap();
        assert!(qb.in_transaction());
        qb.from("drink").unwrap();
        qb.set(&map(json!({"drink_ml": 300}))).unwrap();
        assert_eq!(qb.insert().await.unwrap(), 42);
        assert_eq!(qb.affected_rows(), 1);
        assert_eq!(qb.last_insert_id(), 42);
        qb.commit().await.unwrap();
        assert!(!qb.in_transaction());

        assert_eq!(
            store.statements(),
            vec!["START TRANSACTION", "INSERT INTO drink SET drink_ml = 300", "COMMIT"]
        );
    }

    #[tokio::test]
    async fn tinyint_policy_is_per_builder() {
        let store = ScriptedStore::new();
        for _ in 0..2 {
            store.push_rows(&[("level", ColumnType::Tiny)], vec![vec![Some("5")]]);
        }

        let mut legacy = QueryBuilder::new(store.boxed()).with_tinyint_policy(TinyIntPolicy::Legacy);
        legacy.from("user").unwrap();
        assert_eq!(legacy.get().await.unwrap()[0]["level"], json!(true));

        let mut magnitude = QueryBuilder::new(store.boxed()).with_tinyint_policy(TinyIntPolicy::Magnitude);
        magnitude.from("user").unwrap();
        assert_eq!(magnitude.get().await.unwrap()[0]["level"], json!(5));
    }

    #[tokio::test]
    async fn empty_result_decodes_to_no_rows() {
        let store = ScriptedStore::new();
        let mut qb = builder(&store);
        qb.from("user").unwrap();
        assert!(qb.get().await.unwrap().is_empty());
        assert_eq!(qb.row_count(), 0);
    }
}

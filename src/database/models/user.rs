use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::database::query_builder::{QueryBuilder, QueryError};
use crate::filter::ListParams;

/// Public filter names and the columns they map to.
pub const USER_FILTER_FIELDS: &[(&str, &str)] = &[
    ("email", "user.email"),
    ("name", "user.name"),
    ("active", "user.active"),
];

/// Sortable names; `drink_counter` is an aggregate alias, so it sorts but never filters.
pub const USER_SORT_FIELDS: &[(&str, &str)] = &[
    ("email", "user.email"),
    ("name", "user.name"),
    ("active", "user.active"),
    ("drink_counter", "drink_counter"),
];

const USER_COLUMNS: &[&str] = &[
    "user.id_user AS iduser",
    "user.email",
    "user.name",
    "user.active",
    "count(drink.id_drink) AS drink_counter",
];

/// Lowercase hex SHA-256 of the password, as stored in `user.password`.
pub fn encrypt_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Queries over the `user` table, run through a borrowed builder.
pub struct UsersModel<'a> {
    db: &'a mut QueryBuilder,
}

impl<'a> UsersModel<'a> {
    pub fn new(db: &'a mut QueryBuilder) -> Self {
        Self { db }
    }

    /// Users with their drink counter, narrowed by `conditions` and the
    /// request's allow-listed filters, ordering and paging.
    pub async fn get_users(&mut self, conditions: &Value, params: &ListParams) -> Result<Vec<Map<String, Value>>, QueryError> {
        self.db.clear();
        self.db.select(USER_COLUMNS);
        self.db.from("user")?;
        self.db.join("drink", "drink.id_user = user.id_user", true)?;
        self.db.filter(conditions)?;
        self.db.filter(&params.make_filter(USER_FILTER_FIELDS))?;
        self.db.order_by_fields(&params.make_order(USER_SORT_FIELDS))?;
        self.db.group_by("user.id_user");
        self.db.limit(params.offset, params.limit);
        self.db.get().await
    }

    pub async fn count_users(&mut self, params: &ListParams) -> Result<u64, QueryError> {
        self.db.clear();
        self.db.select("count(distinct user.id_user) AS total_records");
        self.db.from("user")?;
        self.db.filter(&params.make_filter(USER_FILTER_FIELDS))?;
        let rows = self.db.get().await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("total_records"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    pub async fn find_user(&mut self, id: u64) -> Result<Option<Map<String, Value>>, QueryError> {
        let rows = self.get_users(&json!({"user.id_user": id}), &ListParams::default()).await?;
        Ok(rows.into_iter().next())
    }

    /// Whether `email` is taken, optionally ignoring the user `except`.
    pub async fn email_in_use(&mut self, email: &str, except: Option<u64>) -> Result<bool, QueryError> {
        let mut conditions = json!({"user.email": email});
        if let Some(id) = except {
            conditions["user.id_user"] = json!({"dif": id});
        }
        let rows = self.get_users(&conditions, &ListParams::default()).await?;
        Ok(!rows.is_empty())
    }

    /// Login lookup; the only query that reads the password digest.
    pub async fn get_login(&mut self, email: &str) -> Result<Option<Map<String, Value>>, QueryError> {
        self.db.clear();
        self.db.select(["user.id_user AS iduser", "user.email", "user.name", "user.password"]);
        self.db.from("user")?;
        self.db.filter(&json!({"user.email": email}))?;
        let rows = self.db.get().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn user_is_active(&mut self, id: u64) -> Result<bool, QueryError> {
        let active = self
            .find_user(id)
            .await?
            .and_then(|user| user.get("active").cloned())
            .unwrap_or(Value::Bool(false));
        Ok(match active {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
            _ => false,
        })
    }

    pub async fn insert_user(&mut self, email: &str, name: &str, password: &str) -> Result<u64, QueryError> {
        self.db.clear();
        let mut values = Map::new();
        values.insert("email".into(), json!(email));
        values.insert("name".into(), json!(name));
        values.insert("password".into(), json!(encrypt_password(password)));
        self.db.set(&values)?;
        self.db.from("user")?;
        self.db.insert().await
    }

    /// Applies the given changes and re-activates the user.
    pub async fn update_user(
        &mut self,
        id: u64,
        email: Option<&str>,
        name: Option<&str>,
        password: Option<&str>,
    ) -> Result<u64, QueryError> {
        self.db.clear();
        let mut values = Map::new();
        if let Some(email) = email.filter(|e| !e.is_empty()) {
            values.insert("email".into(), json!(email));
        }
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            values.insert("name".into(), json!(name));
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            values.insert("password".into(), json!(encrypt_password(password)));
        }
        values.insert("active".into(), json!(true));
        self.db.set(&values)?;
        self.db.from("user")?;
        self.db.filter(&json!({"id_user": id}))?;
        self.db.update().await
    }

    pub async fn deactivate_user(&mut self, id: u64) -> Result<u64, QueryError> {
        self.db.clear();
        let mut values = Map::new();
        values.insert("active".into(), json!(false));
        self.db.set(&values)?;
        self.db.from("user")?;
        self.db.filter(&json!({"id_user": id}))?;
        self.db.update().await
    }
}

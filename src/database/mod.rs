pub mod decoder;
pub mod manager;
pub mod models;
pub mod query_builder;
pub mod store;

pub use decoder::{ColumnType, TinyIntPolicy};
pub use manager::{DatabaseError, DatabaseManager};
pub use query_builder::{QueryBuilder, QueryError};
pub use store::{ColumnMeta, Connector, MySqlConnector, Store, StoreError, StoreResult};

pub mod coerce;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod testing;

//! Data access for credentials and the world dataset.
//!
//! Handlers only see [`WorldStore`]; the MySQL implementation lives in
//! [`mysql`]. Lookups return `Option` so "no such row" is never confused with
//! a storage failure.

mod models;
mod mysql;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use models::{City, Country, NewCity, User};
pub use mysql::MySqlStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait WorldStore: Send + Sync {
    /// Number of users registered under `username` (0 or 1 with the unique key).
    async fn count_users(&self, username: &str) -> Result<i64, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the username is taken.
    async fn insert_user(&self, username: &str, hashed_password: &str) -> Result<(), StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_city_by_name(&self, name: &str) -> Result<Option<City>, StoreError>;

    /// Every country, ordered by code.
    async fn list_countries(&self) -> Result<Vec<Country>, StoreError>;

    /// Returns the stored row including its generated id.
    async fn insert_city(&self, city: &NewCity) -> Result<City, StoreError>;
}

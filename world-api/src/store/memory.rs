//! In-process [`WorldStore`] used by the HTTP tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{City, Country, NewCity, StoreError, User, WorldStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<BTreeMap<String, String>>,
    cities: RwLock<Vec<City>>,
    countries: Vec<Country>,
    /// `count_users` always reports zero, as if another signup for the same
    /// name committed between the existence check and the insert.
    stale_existence_check: bool,
    insert_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_countries(mut self, countries: Vec<Country>) -> Self {
        self.countries = countries;
        self
    }

    pub fn with_stale_existence_check(mut self) -> Self {
        self.stale_existence_check = true;
        self
    }

    pub async fn insert_user_for_test(&self, username: &str, hashed_password: &str) {
        self.users
            .write()
            .await
            .insert(username.to_string(), hashed_password.to_string());
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub async fn stored_hash(&self, username: &str) -> Option<String> {
        self.users.read().await.get(username).cloned()
    }
}

#[async_trait]
impl WorldStore for MemoryStore {
    async fn count_users(&self, username: &str) -> Result<i64, StoreError> {
        if self.stale_existence_check {
            return Ok(0);
        }
        Ok(i64::from(self.users.read().await.contains_key(username)))
    }

    async fn insert_user(&self, username: &str, hashed_password: &str) -> Result<(), StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(StoreError::Conflict);
        }
        users.insert(username.to_string(), hashed_password.to_string());
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(username).map(|hash| User {
            username: username.to_string(),
            hashed_password: hash.clone(),
        }))
    }

    async fn find_city_by_name(&self, name: &str) -> Result<Option<City>, StoreError> {
        Ok(self
            .cities
            .read()
            .await
            .iter()
            .find(|city| city.name == name)
            .cloned())
    }

    async fn list_countries(&self) -> Result<Vec<Country>, StoreError> {
        let mut countries = self.countries.clone();
        countries.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(countries)
    }

    async fn insert_city(&self, city: &NewCity) -> Result<City, StoreError> {
        let mut cities = self.cities.write().await;
        let id = cities.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let stored = city.clone().into_city(id);
        cities.push(stored.clone());
        Ok(stored)
    }
}

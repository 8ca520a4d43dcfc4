//! In-process stores for dry runs and tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    model::{City, User, WeatherMetricSample},
};

use super::{CityStore, MetricsStore, UserStore};

/// Metrics and city tables kept in memory. Each insert call is recorded as
/// one batch.
#[derive(Debug, Default)]
pub struct MemoryMetricsStore {
    batches: Mutex<Vec<Vec<WeatherMetricSample>>>,
    cities: Mutex<Vec<City>>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<WeatherMetricSample>> {
        self.batches.lock().clone()
    }

    pub fn samples(&self) -> Vec<WeatherMetricSample> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn cities(&self) -> Vec<City> {
        self.cities.lock().clone()
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn insert_samples(&self, samples: &[WeatherMetricSample]) -> Result<()> {
        self.batches.lock().push(samples.to_vec());
        Ok(())
    }
}

#[async_trait]
impl CityStore for MemoryMetricsStore {
    async fn load_cities(&self) -> Result<Vec<City>> {
        Ok(self.cities())
    }

    async fn insert_cities(&self, cities: &[City]) -> Result<()> {
        self.cities.lock().extend_from_slice(cities);
        Ok(())
    }
}

/// Users kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.users.lock().clone())
    }

    async fn user_exists(&self, email: &str) -> Result<bool> {
        Ok(self.users.lock().iter().any(|u| u.email == email))
    }

    async fn get_user(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.lock().iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock();
        if users.iter().any(|u| u.email == user.email) {
            return Err(Error::Conflict(format!("user {}", user.email)));
        }
        users.push(user.clone());
        Ok(())
    }

    async fn update_cities(&self, email: &str, cities: &[String]) -> Result<()> {
        let mut users = self.users.lock();
        let user = users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or_else(|| Error::NotFound(format!("user {email}")))?;
        user.cities = cities.to_vec();
        Ok(())
    }

    async fn delete_user(&self, email: &str) -> Result<bool> {
        let mut users = self.users.lock();
        let before = users.len();
        users.retain(|u| u.email != email);
        Ok(users.len() != before)
    }
}

use async_trait::async_trait;

use crate::{
    error::Result,
    model::{City, User, WeatherMetricSample},
};

pub mod clickhouse;
pub mod memory;
pub mod sqlite;

/// Persistent city table backing the registry.
#[async_trait]
pub trait CityStore: Send + Sync {
    async fn load_cities(&self) -> Result<Vec<City>>;

    /// Writes all rows in one batch, or none.
    async fn insert_cities(&self, cities: &[City]) -> Result<()>;
}

/// Time-series sink for collection ticks.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Writes all samples in one batch, or none.
    async fn insert_samples(&self, samples: &[WeatherMetricSample]) -> Result<()>;
}

/// Subscribers and their city lists.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn user_exists(&self, email: &str) -> Result<bool>;

    async fn get_user(&self, email: &str) -> Result<Option<User>>;

    /// Fails with `Error::Conflict` when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Fails with `Error::NotFound` for an unknown email.
    async fn update_cities(&self, email: &str, cities: &[String]) -> Result<()>;

    /// Returns whether a row was removed.
    async fn delete_user(&self, email: &str) -> Result<bool>;
}

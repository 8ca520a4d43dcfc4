//! Process-wide city registry.
//!
//! Maps normalized city names to coordinates. Many readers (the two
//! pipelines) and occasional writers (registrations) share one instance
//! behind an `Arc`. Every access goes through the inner `RwLock`; guards are
//! never held across an `.await`.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::{
    error::Result,
    model::{City, Coordinates, normalize_city_name},
    store::CityStore,
};

#[derive(Debug, Default)]
pub struct CityRegistry {
    cities: RwLock<HashMap<String, City>>,
}

impl CityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from persisted rows. Duplicate names keep the first row.
    pub fn from_cities(cities: impl IntoIterator<Item = City>) -> Self {
        let registry = Self::new();
        registry.register_all(cities);
        registry
    }

    /// Seeds a registry from the persistent city table.
    pub async fn load(store: &dyn CityStore) -> Result<Self> {
        let rows = store.load_cities().await?;
        let registry = Self::from_cities(rows);
        tracing::info!(cities = registry.len(), "loaded city registry");
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Option<Coordinates> {
        self.cities
            .read()
            .get(&normalize_city_name(name))
            .map(|city| city.coords)
    }

    /// The registered entry, with its display name.
    pub fn get(&self, name: &str) -> Option<City> {
        self.cities.read().get(&normalize_city_name(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cities.read().contains_key(&normalize_city_name(name))
    }

    /// Inserts a city unless it is already known. Existing coordinates are
    /// never overwritten.
    pub fn register(&self, name: &str, coords: Coordinates) -> bool {
        self.register_all([City::new(name.trim(), coords)]) == 1
    }

    /// Inserts a batch under one write lock, so readers see either none or all
    /// of it. Returns how many entries were new.
    pub fn register_all(&self, cities: impl IntoIterator<Item = City>) -> usize {
        let mut map = self.cities.write();
        let mut inserted = 0;
        for city in cities {
            let key = normalize_city_name(&city.name);
            if key.is_empty() || map.contains_key(&key) {
                continue;
            }
            map.insert(key, City::new(city.name.trim(), city.coords));
            inserted += 1;
        }
        inserted
    }

    /// Consistent copy of every entry, sorted by name.
    pub fn snapshot(&self) -> Vec<City> {
        let mut cities: Vec<City> = self.cities.read().values().cloned().collect();
        cities.sort_by(|a, b| a.name.cmp(&b.name));
        cities
    }

    pub fn len(&self) -> usize {
        self.cities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Grows the city registry from user-supplied names.
//!
//! Resolution is fail-fast: the first name that cannot be geocoded aborts the
//! whole call, and nothing resolved so far is persisted or registered.

use std::{collections::HashSet, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    error::{Error, Result},
    model::{City, normalize_city_name},
    provider::WeatherProvider,
    registry::CityRegistry,
    store::CityStore,
};

pub struct CityResolver {
    registry: Arc<CityRegistry>,
    provider: Arc<dyn WeatherProvider>,
    store: Arc<dyn CityStore>,
    commit: Mutex<()>,
}

impl CityResolver {
    pub fn new(
        registry: Arc<CityRegistry>,
        provider: Arc<dyn WeatherProvider>,
        store: Arc<dyn CityStore>,
    ) -> Self {
        Self {
            registry,
            provider,
            store,
            commit: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<CityRegistry> {
        &self.registry
    }

    /// Makes every name known and returns their registry names, in first-seen
    /// input order without duplicates.
    pub async fn resolve_and_register(&self, names: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut wanted = Vec::new();
        for name in names {
            let key = normalize_city_name(name);
            if key.is_empty() {
                return Err(Error::Validation("city name must not be blank".into()));
            }
            if seen.insert(key) {
                wanted.push(name.trim().to_string());
            }
        }

        let mut resolved = Vec::new();
        for name in &wanted {
            if self.registry.contains(name) {
                continue;
            }
            let candidates = self.provider.geocode(name).await?;
            let best = candidates
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound(format!("no geocoding results for city '{name}'")))?;
            tracing::debug!(city = %name, match_name = %best.name, lat = best.coords.lat, lon = best.coords.lon, "resolved city");
            resolved.push(City::new(name.clone(), best.coords));
        }

        if !resolved.is_empty() {
            self.commit(resolved).await?;
        }

        Ok(wanted
            .into_iter()
            .map(|name| self.registry.get(&name).map(|city| city.name).unwrap_or(name))
            .collect())
    }

    /// Persists then registers newly resolved cities as one unit. Cities that
    /// another caller registered in the meantime are dropped; the earlier
    /// resolution wins.
    async fn commit(&self, resolved: Vec<City>) -> Result<()> {
        let _guard = self.commit.lock().await;

        let fresh: Vec<City> = resolved
            .into_iter()
            .filter(|city| !self.registry.contains(&city.name))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        self.store.insert_cities(&fresh).await?;
        let added = self.registry.register_all(fresh);
        tracing::info!(added, "registered new cities");
        Ok(())
    }
}

//! Periodic snapshot of current weather for every registered city.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::Result,
    model::WeatherMetricSample,
    provider::WeatherProvider,
    registry::CityRegistry,
    scheduler::Job,
    store::MetricsStore,
};

pub struct MetricsCollector {
    registry: Arc<CityRegistry>,
    provider: Arc<dyn WeatherProvider>,
    store: Arc<dyn MetricsStore>,
}

impl MetricsCollector {
    pub fn new(
        registry: Arc<CityRegistry>,
        provider: Arc<dyn WeatherProvider>,
        store: Arc<dyn MetricsStore>,
    ) -> Self {
        Self {
            registry,
            provider,
            store,
        }
    }

    /// Runs one collection tick and returns the number of rows written.
    ///
    /// Any failed fetch aborts the tick before anything is written; the next
    /// tick starts from scratch.
    pub async fn collect_once(&self) -> Result<usize> {
        let cities = self.registry.snapshot();
        if cities.is_empty() {
            tracing::debug!("no registered cities, nothing to collect");
            return Ok(0);
        }

        let mut samples = Vec::with_capacity(cities.len());
        for city in &cities {
            let obs = self
                .provider
                .current_observation(city.coords)
                .await
                .inspect_err(|e| tracing::warn!(city = %city.name, error = %e, "current weather fetch failed"))?;
            samples.push(WeatherMetricSample::from_observation(city.name.clone(), obs));
        }

        self.store.insert_samples(&samples).await?;
        tracing::info!(rows = samples.len(), "weather metrics inserted");
        Ok(samples.len())
    }
}

#[async_trait]
impl Job for MetricsCollector {
    fn name(&self) -> &'static str {
        "metrics-collection"
    }

    async fn run(&self) -> Result<()> {
        self.collect_once().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        model::City,
        store::memory::MemoryMetricsStore,
        testing::{BERLIN, FakeProvider, OSLO, PARIS, observation, upstream},
    };

    fn collector(provider: FakeProvider, cities: Vec<City>) -> (MetricsCollector, Arc<FakeProvider>, Arc<MemoryMetricsStore>) {
        let provider = Arc::new(provider);
        let store = Arc::new(MemoryMetricsStore::new());
        let collector = MetricsCollector::new(
            Arc::new(CityRegistry::from_cities(cities)),
            Arc::clone(&provider) as Arc<dyn WeatherProvider>,
            Arc::clone(&store) as Arc<dyn MetricsStore>,
        );
        (collector, provider, store)
    }

    #[tokio::test]
    async fn full_success_writes_one_batch() {
        let (collector, _, store) = collector(
            FakeProvider::new()
                .current(PARIS, Ok(observation(10.0)))
                .current(OSLO, Ok(observation(-3.0))),
            vec![City::new("Paris", PARIS), City::new("Oslo", OSLO)],
        );

        assert_eq!(collector.collect_once().await.unwrap(), 2);

        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        let oslo = batches[0].iter().find(|s| s.city == "Oslo").unwrap();
        assert_eq!(oslo.temperature_c, -3.0);
        assert_eq!(oslo.feels_like_c, -5.0);
        assert_eq!(oslo.pressure_hpa, 1013);
        assert_eq!(oslo.wind_deg, 180);
    }

    #[tokio::test]
    async fn one_failure_aborts_whole_tick() {
        let (collector, _, store) = collector(
            FakeProvider::new()
                .current(BERLIN, Ok(observation(5.0)))
                .current(OSLO, Err(upstream("current weather")))
                .current(PARIS, Ok(observation(12.0))),
            vec![
                City::new("Berlin", BERLIN),
                City::new("Oslo", OSLO),
                City::new("Paris", PARIS),
            ],
        );

        let err = collector.collect_once().await.unwrap_err();

        assert!(matches!(err, Error::Upstream { .. }));
        assert!(store.batches().is_empty());
        assert!(store.samples().is_empty());
    }

    #[tokio::test]
    async fn next_tick_retries_from_scratch() {
        let (collector, provider, store) = collector(
            FakeProvider::new().current(PARIS, Err(Error::transport("current weather", "reset"))),
            vec![City::new("Paris", PARIS)],
        );
        assert!(collector.collect_once().await.is_err());

        collector.registry.register("Oslo", OSLO);
        assert!(collector.collect_once().await.is_err());
        assert_eq!(provider.current_calls().len(), 2);
        assert!(store.samples().is_empty());
    }

    #[tokio::test]
    async fn empty_registry_skips_store() {
        let (collector, provider, store) = collector(FakeProvider::new(), vec![]);

        assert_eq!(collector.collect_once().await.unwrap(), 0);
        assert!(provider.current_calls().is_empty());
        assert!(store.batches().is_empty());
    }

    #[tokio::test]
    async fn job_reports_failure() {
        let (collector, _, _) = collector(FakeProvider::new(), vec![City::new("Paris", PARIS)]);
        assert_eq!(collector.name(), "metrics-collection");
        assert!(collector.run().await.is_err());
    }
}

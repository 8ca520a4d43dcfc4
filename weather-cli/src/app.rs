//! Wiring of configured adapters into the core services.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, Offset};
use weather_digest_core::{
    CityRegistry, CityResolver, Config, DigestComposer, MetricsCollector, NotificationDispatcher,
    TaskQueue, UserRegistration, UserStore, WeatherProvider,
    provider::provider_from_config,
    queue::{amqp::AmqpQueue, memory::MemoryQueue},
    store::{clickhouse::ClickHouseStore, sqlite::SqliteUserStore},
};

pub struct App {
    config: Config,
}

impl App {
    /// Loads the config file and applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Config::load()?;
        config.apply_env();
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> Result<Arc<dyn WeatherProvider>> {
        Ok(Arc::new(provider_from_config(&self.config)?))
    }

    /// ClickHouse store with its tables in place.
    pub async fn clickhouse(&self) -> Result<Arc<ClickHouseStore>> {
        let store = ClickHouseStore::new(&self.config.clickhouse)?;
        store
            .ensure_schema()
            .await
            .context("Failed to prepare ClickHouse tables")?;
        Ok(Arc::new(store))
    }

    pub async fn registry(&self, store: &ClickHouseStore) -> Result<Arc<CityRegistry>> {
        let registry = CityRegistry::load(store)
            .await
            .context("Failed to load city registry")?;
        Ok(Arc::new(registry))
    }

    pub fn users(&self) -> Result<Arc<dyn UserStore>> {
        let path = self.config.users_db_path()?;
        let store = SqliteUserStore::open(&path)
            .with_context(|| format!("Failed to open user database: {}", path.display()))?;
        Ok(Arc::new(store))
    }

    pub async fn amqp(&self) -> Result<Arc<AmqpQueue>> {
        let queue = AmqpQueue::connect(&self.config.rabbitmq)
            .await
            .context("Failed to connect to RabbitMQ")?;
        Ok(Arc::new(queue))
    }

    /// Forecast times render in the configured offset, or the host's.
    pub fn composer(&self) -> Result<DigestComposer> {
        let offset = match self.config.digest.utc_offset()? {
            Some(offset) => offset,
            None => Local::now().offset().fix(),
        };
        Ok(DigestComposer::new(offset))
    }

    pub fn collector(
        &self,
        registry: Arc<CityRegistry>,
        provider: Arc<dyn WeatherProvider>,
        store: Arc<ClickHouseStore>,
    ) -> MetricsCollector {
        MetricsCollector::new(registry, provider, store)
    }

    pub fn dispatcher(
        &self,
        registry: Arc<CityRegistry>,
        provider: Arc<dyn WeatherProvider>,
        users: Arc<dyn UserStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Result<NotificationDispatcher> {
        Ok(
            NotificationDispatcher::new(registry, provider, users, queue, self.composer()?)
                .with_publish_timeout(self.config.schedule.publish_timeout()),
        )
    }

    /// User flows backed by the configured stores. `queue` receives welcome
    /// tasks; pass `None` for flows that never publish.
    pub async fn registration(&self, queue: Option<Arc<dyn TaskQueue>>) -> Result<UserRegistration> {
        let clickhouse = self.clickhouse().await?;
        let registry = self.registry(&clickhouse).await?;
        let provider = self.provider()?;
        let users = self.users()?;
        let queue = queue.unwrap_or_else(|| Arc::new(MemoryQueue::new()) as Arc<dyn TaskQueue>);

        let resolver = Arc::new(CityResolver::new(
            Arc::clone(&registry),
            Arc::clone(&provider),
            clickhouse,
        ));
        let dispatcher = Arc::new(self.dispatcher(registry, provider, Arc::clone(&users), queue)?);
        Ok(UserRegistration::new(users, resolver, dispatcher))
    }
}

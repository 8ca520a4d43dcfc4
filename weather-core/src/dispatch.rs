//! Per-user digest dispatch and welcome notifications.
//!
//! Failures are isolated: a city that cannot be forecast is left out of the
//! digest, and a digest that cannot be published is dropped for this cycle.
//! Nothing is retried before the next cycle.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::{
    digest::{DigestComposer, ForecastCache},
    error::{Error, Result},
    model::{NotificationTask, User},
    provider::WeatherProvider,
    queue::TaskQueue,
    registry::CityRegistry,
    scheduler::Job,
    store::UserStore,
};

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes tasks, each call bounded by its own timeout.
#[derive(Clone)]
pub struct Publisher {
    queue: Arc<dyn TaskQueue>,
    timeout: Duration,
}

impl Publisher {
    pub fn new(queue: Arc<dyn TaskQueue>, timeout: Duration) -> Self {
        Self { queue, timeout }
    }

    pub async fn publish(&self, task: &NotificationTask) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.queue.publish(task)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("publish", self.timeout)),
        }
    }
}

/// Outcome counters of one dispatch cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub users: usize,
    pub published: usize,
    /// Users with no forecast to send.
    pub skipped: usize,
    /// Users whose digest could not be published.
    pub failed: usize,
}

pub struct NotificationDispatcher {
    registry: Arc<CityRegistry>,
    provider: Arc<dyn WeatherProvider>,
    users: Arc<dyn UserStore>,
    publisher: Publisher,
    composer: DigestComposer,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<CityRegistry>,
        provider: Arc<dyn WeatherProvider>,
        users: Arc<dyn UserStore>,
        queue: Arc<dyn TaskQueue>,
        composer: DigestComposer,
    ) -> Self {
        Self {
            registry,
            provider,
            users,
            publisher: Publisher::new(queue, DEFAULT_PUBLISH_TIMEOUT),
            composer,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publisher.timeout = timeout;
        self
    }

    /// Runs one dispatch cycle. Only failing to list users fails the cycle.
    pub async fn dispatch_once(&self) -> Result<DispatchReport> {
        let users = self.users.list_users().await?;
        let mut cache = ForecastCache::new(Arc::clone(&self.registry), Arc::clone(&self.provider));
        let mut report = DispatchReport {
            users: users.len(),
            ..DispatchReport::default()
        };

        for user in &users {
            tracing::debug!(email = %user.email, cities = ?user.cities, "processing user");

            let Some(task) = self.digest_for(user, &mut cache).await else {
                tracing::info!(email = %user.email, "no forecasts available, skipping user");
                report.skipped += 1;
                continue;
            };

            match self.publisher.publish(&task).await {
                Ok(()) => {
                    tracing::debug!(email = %user.email, "digest published");
                    report.published += 1;
                }
                Err(e) => {
                    tracing::warn!(email = %user.email, error = %e, "digest publish failed, dropping");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            users = report.users,
            published = report.published,
            skipped = report.skipped,
            failed = report.failed,
            forecasts = cache.len(),
            "dispatch cycle finished"
        );
        Ok(report)
    }

    async fn digest_for(&self, user: &User, cache: &mut ForecastCache) -> Option<NotificationTask> {
        let mut sections = Vec::with_capacity(user.cities.len());
        for city in &user.cities {
            if let Some(series) = cache.get(city).await {
                let name = self
                    .registry
                    .get(city)
                    .map(|c| c.name)
                    .unwrap_or_else(|| city.clone());
                sections.push((name, series));
            }
        }

        if sections.is_empty() {
            return None;
        }
        let body = self.composer.compose(&sections);
        Some(self.composer.digest_task(&user.email, body))
    }

    /// Publishes a welcome task on a detached task. The caller does not wait
    /// for it; a failed publish is logged and the task is lost.
    pub fn spawn_welcome(&self, email: &str) -> JoinHandle<()> {
        let publisher = self.publisher.clone();
        let task = self.composer.welcome_task(email);
        tokio::spawn(async move {
            match publisher.publish(&task).await {
                Ok(()) => tracing::debug!(email = %task.to, "welcome published"),
                Err(e) => tracing::warn!(email = %task.to, error = %e, "welcome publish failed"),
            }
        })
    }
}

#[async_trait]
impl Job for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "digest-dispatch"
    }

    async fn run(&self) -> Result<()> {
        self.dispatch_once().await.map(|_| ())
    }
}

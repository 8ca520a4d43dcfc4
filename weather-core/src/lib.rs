//! Core library for the weather digest service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The OpenWeather provider and the storage/queue adapters
//! - The city registry and geocoding resolver
//! - Periodic metrics collection and digest dispatch
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod collector;
pub mod config;
pub mod digest;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod provider;
pub mod queue;
pub mod registration;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod testing;

pub use collector::MetricsCollector;
pub use config::{Config, Secret};
pub use digest::{DigestComposer, ForecastCache};
pub use dispatch::{DispatchReport, NotificationDispatcher};
pub use error::{Error, Result};
pub use model::{
    City, Coordinates, ForecastPoint, ForecastSeries, NotificationTask, Observation, User,
    WeatherMetricSample,
};
pub use provider::{WeatherProvider, provider_from_config};
pub use queue::TaskQueue;
pub use registration::{Registration, UserRegistration};
pub use registry::CityRegistry;
pub use resolver::CityResolver;
pub use scheduler::{Job, Scheduler, TokioTime};
pub use store::{CityStore, MetricsStore, UserStore};

use crate::{
    Config,
    error::Result,
    model::{Coordinates, ForecastPoint, GeoCandidate, Observation},
    provider::openweather::{Endpoints, OpenWeatherProvider},
};
use anyhow::Context;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Read-only access to the weather data source. All values are metric.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Ranked candidates for a city name, best match first.
    async fn geocode(&self, name: &str) -> Result<Vec<GeoCandidate>>;

    async fn current_observation(&self, at: Coordinates) -> Result<Observation>;

    /// Hourly forecast points in chronological order.
    async fn hourly_forecast(&self, at: Coordinates) -> Result<Vec<ForecastPoint>>;
}

/// Construct the OpenWeather provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<OpenWeatherProvider> {
    let api_key = config.provider_api_key()?;

    let mut endpoints = Endpoints::default();
    if let Some(url) = &config.provider.data_url {
        endpoints.data = url.clone();
    }
    if let Some(url) = &config.provider.geo_url {
        endpoints.geo = url.clone();
    }

    OpenWeatherProvider::with_endpoints(api_key.to_owned(), endpoints)
        .context("Failed to build OpenWeather client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("No weather provider API key"));
    }

    #[test]
    fn provider_from_config_uses_url_overrides() {
        let mut cfg = Config::default();
        cfg.provider.api_key = Secret::new("KEY");
        cfg.provider.data_url = Some("http://127.0.0.1:9000".into());

        let provider = provider_from_config(&cfg).unwrap();
        assert_eq!(provider.endpoints().data, "http://127.0.0.1:9000");
        assert_eq!(provider.endpoints().geo, Endpoints::default().geo);
    }

    #[test]
    fn provider_debug_hides_key() {
        let mut cfg = Config::default();
        cfg.provider.api_key = Secret::new("VERY-SECRET");
        let provider = provider_from_config(&cfg).unwrap();
        assert!(!format!("{provider:?}").contains("VERY-SECRET"));
    }
}

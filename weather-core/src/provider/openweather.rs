use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;

use crate::{
    config::Secret,
    error::{Error, Result, truncate_body},
    model::{Coordinates, ForecastPoint, GeoCandidate, Observation},
};

use super::WeatherProvider;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const GEOCODE_LIMIT: &str = "1";

/// Base URLs of the OpenWeather APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Current weather and hourly forecast.
    pub data: String,
    /// Direct geocoding.
    pub geo: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            data: "https://pro.openweathermap.org".to_string(),
            geo: "http://api.openweathermap.org".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: Secret,
    endpoints: Endpoints,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn with_endpoints(api_key: String, endpoints: Endpoints) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::from_reqwest("http client", e))?;

        Ok(Self {
            api_key: Secret::new(api_key),
            endpoints,
            http,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// GET a JSON document. The key travels as `appid` and is never logged.
    async fn get_json<T: DeserializeOwned>(
        &self,
        context: &'static str,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T> {
        tracing::debug!(%url, ?query, "OpenWeather request");

        let res = self
            .http
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.expose())])
            .send()
            .await
            .map_err(|e| Error::from_reqwest(context, e))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| Error::from_reqwest(context, e))?;

        tracing::debug!(%status, sample = %truncate_body(&body), "OpenWeather response");

        if !status.is_success() {
            return Err(Error::upstream(context, status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| Error::data(context, e))
    }

    fn coordinate_query(at: Coordinates) -> Vec<(&'static str, String)> {
        vec![
            ("lat", at.lat.to_string()),
            ("lon", at.lon.to_string()),
            ("units", "metric".to_string()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct OwGeoEntry {
    name: String,
    lat: f64,
    lon: f64,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: i64,
    main: OwMain,
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    wind: OwWind,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    #[serde(default)]
    list: Vec<OwForecastEntry>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn geocode(&self, name: &str) -> Result<Vec<GeoCandidate>> {
        let url = format!("{}/geo/1.0/direct", self.endpoints.geo);
        let entries: Vec<OwGeoEntry> = self
            .get_json(
                "geocode",
                url,
                &[("q", name.to_string()), ("limit", GEOCODE_LIMIT.to_string())],
            )
            .await?;

        if entries.is_empty() {
            tracing::debug!(city = %name, "geocode returned no results");
        }

        Ok(entries
            .into_iter()
            .map(|e| GeoCandidate {
                name: e.name,
                coords: Coordinates::new(e.lat, e.lon),
                country: e.country,
            })
            .collect())
    }

    async fn current_observation(&self, at: Coordinates) -> Result<Observation> {
        let url = format!("{}/data/2.5/weather", self.endpoints.data);
        let parsed: OwCurrentResponse = self
            .get_json("current weather", url, &Self::coordinate_query(at))
            .await?;

        Ok(Observation {
            observed_at: unix_to_utc(parsed.dt)?,
            temperature_c: parsed.main.temp,
            feels_like_c: parsed.main.feels_like,
            pressure_hpa: to_i16("pressure", parsed.main.pressure)?,
            wind_speed_mps: parsed.wind.speed,
            wind_deg: to_i16("wind direction", parsed.wind.deg)?,
        })
    }

    async fn hourly_forecast(&self, at: Coordinates) -> Result<Vec<ForecastPoint>> {
        let url = format!("{}/data/2.5/forecast/hourly", self.endpoints.data);
        let parsed: OwForecastResponse = self
            .get_json("hourly forecast", url, &Self::coordinate_query(at))
            .await?;

        if parsed.list.is_empty() {
            return Err(Error::data("hourly forecast", "empty forecast data"));
        }

        parsed
            .list
            .into_iter()
            .map(|entry| {
                Ok(ForecastPoint {
                    timestamp: unix_to_utc(entry.dt)?,
                    temperature_c: entry.main.temp,
                    feels_like_c: entry.main.feels_like,
                    pressure_hpa: to_i16("pressure", entry.main.pressure)?,
                    wind_speed_mps: entry.wind.speed,
                    description: entry.weather.into_iter().next().map(|w| w.description),
                })
            })
            .collect()
    }
}

fn unix_to_utc(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| Error::data("timestamp", format!("out of range: {ts}")))
}

fn to_i16(field: &str, value: f64) -> Result<i16> {
    let rounded = value.round();
    if rounded.is_finite() && rounded >= f64::from(i16::MIN) && rounded <= f64::from(i16::MAX) {
        Ok(rounded as i16)
    } else {
        Err(Error::data(field, format!("value out of range: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_conversion_rounds_and_bounds() {
        assert_eq!(to_i16("p", 1013.4).unwrap(), 1013);
        assert_eq!(to_i16("p", 359.6).unwrap(), 360);
        assert!(to_i16("p", 1e9).is_err());
        assert!(to_i16("p", f64::NAN).is_err());
    }

    #[test]
    fn forecast_entry_without_weather_has_no_description() {
        let raw = r#"{"list":[{"dt":1700000000,"main":{"temp":1.5,"feels_like":-1.0,"pressure":1012},"wind":{"speed":3.2}}]}"#;
        let parsed: OwForecastResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.list[0].weather.is_empty());
        assert_eq!(parsed.list[0].wind.deg, 0.0);
    }
}

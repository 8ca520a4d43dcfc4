use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of hourly points that make up one forecast series.
pub const FORECAST_HOURS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A registered city. Coordinates never change once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    #[serde(flatten)]
    pub coords: Coordinates,
}

impl City {
    pub fn new(name: impl Into<String>, coords: Coordinates) -> Self {
        Self {
            name: name.into(),
            coords,
        }
    }
}

/// Registry key for a city name: trimmed and lowercased.
pub fn normalize_city_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One ranked geocoding result.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoCandidate {
    pub name: String,
    pub coords: Coordinates,
    pub country: Option<String>,
}

/// Current conditions as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub observed_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub pressure_hpa: i16,
    pub wind_speed_mps: f64,
    pub wind_deg: i16,
}

/// One row of the metrics table.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherMetricSample {
    pub timestamp: DateTime<Utc>,
    pub city: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub pressure_hpa: i16,
    pub wind_speed_mps: f64,
    pub wind_deg: i16,
}

impl WeatherMetricSample {
    pub fn from_observation(city: impl Into<String>, obs: Observation) -> Self {
        Self {
            timestamp: obs.observed_at,
            city: city.into(),
            temperature_c: obs.temperature_c,
            feels_like_c: obs.feels_like_c,
            pressure_hpa: obs.pressure_hpa,
            wind_speed_mps: obs.wind_speed_mps,
            wind_deg: obs.wind_deg,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub pressure_hpa: i16,
    pub wind_speed_mps: f64,
    pub description: Option<String>,
}

/// The next 24 hourly points for one city.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    /// Keeps the first [`FORECAST_HOURS`] points; fewer than that is a data error.
    pub fn from_points(mut points: Vec<ForecastPoint>) -> Result<Self> {
        if points.len() < FORECAST_HOURS {
            return Err(Error::data(
                "hourly forecast",
                format!("expected {FORECAST_HOURS} points, got {}", points.len()),
            ));
        }
        points.truncate(FORECAST_HOURS);
        Ok(Self { points })
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }
}

/// A subscriber as owned by the user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub cities: Vec<String>,
}

/// Unit of work handed to the email queue.
///
/// Wire format: `{to, subject, body, type?, meta?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTask {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, serde_json::Value>>,
}

impl NotificationTask {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::data("notification task", e))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::data("notification task", e))
    }
}

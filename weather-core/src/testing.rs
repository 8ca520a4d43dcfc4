//! Scripted collaborators shared by the unit tests.

use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    error::{Error, Result},
    model::{Coordinates, ForecastPoint, GeoCandidate, NotificationTask, Observation},
    provider::WeatherProvider,
    queue::{TaskQueue, memory::MemoryQueue},
};

pub(crate) const PARIS: Coordinates = Coordinates { lat: 48.85, lon: 2.35 };
pub(crate) const ROME: Coordinates = Coordinates { lat: 41.89, lon: 12.48 };
pub(crate) const OSLO: Coordinates = Coordinates { lat: 59.91, lon: 10.75 };
pub(crate) const TOKYO: Coordinates = Coordinates { lat: 35.68, lon: 139.69 };
pub(crate) const BERLIN: Coordinates = Coordinates { lat: 52.52, lon: 13.40 };

pub(crate) fn upstream(context: &str) -> Error {
    Error::upstream(context, 500, "boom")
}

pub(crate) fn observation(temp: f64) -> Observation {
    Observation {
        observed_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        temperature_c: temp,
        feels_like_c: temp - 2.0,
        pressure_hpa: 1013,
        wind_speed_mps: 4.0,
        wind_deg: 180,
    }
}

/// `n` hourly points starting at 2023-11-14 22:00 UTC.
pub(crate) fn points(n: usize, temp: f64) -> Vec<ForecastPoint> {
    (0..n)
        .map(|i| ForecastPoint {
            timestamp: DateTime::from_timestamp(1_699_999_200 + 3600 * i as i64, 0).unwrap(),
            temperature_c: temp,
            feels_like_c: temp - 1.0,
            pressure_hpa: 1000,
            wind_speed_mps: 3.0,
            description: Some("light rain".into()),
        })
        .collect()
}

/// Provider answering from scripts and counting every call.
#[derive(Debug, Default)]
pub(crate) struct FakeProvider {
    geo: Mutex<HashMap<String, Result<Vec<GeoCandidate>>>>,
    current: Mutex<Vec<(Coordinates, Result<Observation>)>>,
    forecast: Mutex<Vec<(Coordinates, VecDeque<Result<Vec<ForecastPoint>>>)>>,
    geocode_calls: Mutex<Vec<String>>,
    current_calls: Mutex<Vec<Coordinates>>,
    forecast_calls: Mutex<Vec<Coordinates>>,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn geocodes(self, name: &str, coords: Coordinates) -> Self {
        let candidate = GeoCandidate {
            name: name.to_string(),
            coords,
            country: None,
        };
        self.geo.lock().insert(name.to_lowercase(), Ok(vec![candidate]));
        self
    }

    pub(crate) fn geocode_result(self, name: &str, result: Result<Vec<GeoCandidate>>) -> Self {
        self.geo.lock().insert(name.to_lowercase(), result);
        self
    }

    pub(crate) fn current(self, at: Coordinates, result: Result<Observation>) -> Self {
        self.current.lock().push((at, result));
        self
    }

    /// Scripts successive forecast answers; the last one repeats.
    pub(crate) fn forecasts(self, at: Coordinates, results: Vec<Result<Vec<ForecastPoint>>>) -> Self {
        self.forecast.lock().push((at, results.into()));
        self
    }

    pub(crate) fn geocode_calls(&self) -> Vec<String> {
        self.geocode_calls.lock().clone()
    }

    pub(crate) fn current_calls(&self) -> Vec<Coordinates> {
        self.current_calls.lock().clone()
    }

    pub(crate) fn forecast_calls(&self) -> Vec<Coordinates> {
        self.forecast_calls.lock().clone()
    }
}

#[async_trait]
impl WeatherProvider for FakeProvider {
    async fn geocode(&self, name: &str) -> Result<Vec<GeoCandidate>> {
        self.geocode_calls.lock().push(name.to_string());
        self.geo
            .lock()
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn current_observation(&self, at: Coordinates) -> Result<Observation> {
        self.current_calls.lock().push(at);
        self.current
            .lock()
            .iter()
            .find(|(c, _)| *c == at)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| Err(upstream("current weather")))
    }

    async fn hourly_forecast(&self, at: Coordinates) -> Result<Vec<ForecastPoint>> {
        self.forecast_calls.lock().push(at);
        let mut scripts = self.forecast.lock();
        let Some((_, queue)) = scripts.iter_mut().find(|(c, _)| *c == at) else {
            return Err(upstream("hourly forecast"));
        };
        match queue.len() {
            0 => Err(upstream("hourly forecast")),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or_else(|| Err(upstream("hourly forecast"))),
        }
    }
}

/// Queue that rejects tasks for some recipients and records the rest.
#[derive(Debug, Default)]
pub(crate) struct FlakyQueue {
    pub(crate) accepted: MemoryQueue,
    reject: HashSet<String>,
    hang: HashSet<String>,
}

impl FlakyQueue {
    pub(crate) fn rejecting(recipients: &[&str]) -> Self {
        Self {
            reject: recipients.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn hanging(recipients: &[&str]) -> Self {
        Self {
            hang: recipients.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl TaskQueue for FlakyQueue {
    async fn publish(&self, task: &NotificationTask) -> Result<()> {
        if self.hang.contains(&task.to) {
            std::future::pending::<()>().await;
        }
        if self.reject.contains(&task.to) {
            return Err(Error::transport("publish", "connection refused"));
        }
        self.accepted.publish(task).await
    }
}

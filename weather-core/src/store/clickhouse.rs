//! ClickHouse adapter.
//!
//! Every batch goes through one `INSERT`, so ClickHouse applies it
//! all-or-nothing. Column types follow the tables below: `DateTime` maps to
//! `u32` seconds and `Float32` to `f32` in `RowBinary`.

use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    config::ClickHouseConfig,
    error::{Error, Result},
    model::{City, Coordinates, WeatherMetricSample},
};

use super::{CityStore, MetricsStore};

const METRICS_TABLE: &str = "weather_metrics";
const CITIES_TABLE: &str = "cities";

const CREATE_METRICS_TABLE: &str = "CREATE TABLE IF NOT EXISTS weather_metrics (
    timestamp DateTime,
    city String,
    temp Float32,
    app_temp Float32,
    pressure Int16,
    wind_speed Float32,
    wind_deg Int16
) ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY timestamp";

const CREATE_CITIES_TABLE: &str = "CREATE TABLE IF NOT EXISTS cities (
    city String,
    lat Float32,
    lon Float32
) ENGINE = MergeTree()
ORDER BY (city)";

/// Row of `weather_metrics`.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct MetricRow {
    /// Unix seconds.
    pub timestamp: u32,
    pub city: String,
    pub temp: f32,
    pub app_temp: f32,
    pub pressure: i16,
    pub wind_speed: f32,
    pub wind_deg: i16,
}

impl MetricRow {
    fn from_sample(sample: &WeatherMetricSample) -> Result<Self> {
        let timestamp = u32::try_from(sample.timestamp.timestamp()).map_err(|_| {
            Error::data(
                METRICS_TABLE,
                format!("timestamp out of DateTime range: {}", sample.timestamp),
            )
        })?;

        Ok(Self {
            timestamp,
            city: sample.city.clone(),
            temp: sample.temperature_c as f32,
            app_temp: sample.feels_like_c as f32,
            pressure: sample.pressure_hpa,
            wind_speed: sample.wind_speed_mps as f32,
            wind_deg: sample.wind_deg,
        })
    }
}

/// Row of `cities`.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct CityRow {
    pub city: String,
    pub lat: f32,
    pub lon: f32,
}

impl From<CityRow> for City {
    fn from(row: CityRow) -> Self {
        City::new(row.city, Coordinates::new(f64::from(row.lat), f64::from(row.lon)))
    }
}

impl From<&City> for CityRow {
    fn from(city: &City) -> Self {
        Self {
            city: city.name.clone(),
            lat: city.coords.lat as f32,
            lon: city.coords.lon as f32,
        }
    }
}

#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
    url: String,
    database: String,
}

impl fmt::Debug for ClickHouseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickHouseStore")
            .field("url", &self.url)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl ClickHouseStore {
    pub fn new(config: &ClickHouseConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::Config("clickhouse url is empty".into()));
        }

        let url = config.url.trim_end_matches('/').to_string();
        let client = Client::default()
            .with_url(&url)
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(config.password.expose());

        Ok(Self {
            client,
            url,
            database: config.database.clone(),
        })
    }

    /// Creates the metrics and city tables when missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in [CREATE_METRICS_TABLE, CREATE_CITIES_TABLE] {
            self.client
                .query(statement)
                .execute()
                .await
                .map_err(|e| clickhouse_error("create table", e))?;
        }
        Ok(())
    }

    async fn insert_rows<T>(&self, table: &'static str, rows: &[T]) -> Result<()>
    where
        T: Row + Serialize + Send + Sync,
    {
        let mut insert = self
            .client
            .insert(table)
            .map_err(|e| clickhouse_error(table, e))?;
        for row in rows {
            insert.write(row).await.map_err(|e| clickhouse_error(table, e))?;
        }
        insert.end().await.map_err(|e| clickhouse_error(table, e))
    }
}

/// Network failures are transport errors; anything the server rejects or
/// that fails to (de)serialize is a storage error.
fn clickhouse_error(context: &str, err: clickhouse::error::Error) -> Error {
    match err {
        clickhouse::error::Error::Network(_) | clickhouse::error::Error::TimedOut => {
            Error::transport(format!("clickhouse {context}"), err)
        }
        other => Error::Storage(format!("clickhouse {context}: {other}")),
    }
}

#[async_trait]
impl MetricsStore for ClickHouseStore {
    async fn insert_samples(&self, samples: &[WeatherMetricSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let rows = samples
            .iter()
            .map(MetricRow::from_sample)
            .collect::<Result<Vec<_>>>()?;
        self.insert_rows(METRICS_TABLE, &rows).await?;
        tracing::debug!(rows = rows.len(), "inserted weather metrics");
        Ok(())
    }
}

#[async_trait]
impl CityStore for ClickHouseStore {
    async fn load_cities(&self) -> Result<Vec<City>> {
        let rows = self
            .client
            .query("SELECT ?fields FROM cities")
            .fetch_all::<CityRow>()
            .await
            .map_err(|e| clickhouse_error("select cities", e))?;

        Ok(rows.into_iter().map(City::from).collect())
    }

    async fn insert_cities(&self, cities: &[City]) -> Result<()> {
        if cities.is_empty() {
            return Ok(());
        }

        let rows: Vec<CityRow> = cities.iter().map(CityRow::from).collect();
        self.insert_rows(CITIES_TABLE, &rows).await?;
        tracing::debug!(rows = rows.len(), "inserted cities");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use chrono::DateTime;

    fn sample(ts: i64) -> WeatherMetricSample {
        WeatherMetricSample {
            timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
            city: "Oslo".into(),
            temperature_c: 1.5,
            feels_like_c: -0.5,
            pressure_hpa: 1013,
            wind_speed_mps: 4.5,
            wind_deg: 90,
        }
    }

    #[test]
    fn empty_url_is_a_config_error() {
        let config = ClickHouseConfig {
            url: String::new(),
            ..ClickHouseConfig::default()
        };
        assert!(matches!(ClickHouseStore::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn metric_row_uses_unix_seconds() {
        let row = MetricRow::from_sample(&sample(1_700_000_000)).unwrap();
        assert_eq!(row.timestamp, 1_700_000_000);
        assert_eq!(row.city, "Oslo");
        assert_eq!(row.app_temp, -0.5);
        assert_eq!(row.pressure, 1013);
    }

    #[test]
    fn pre_epoch_timestamp_is_a_data_error() {
        let err = MetricRow::from_sample(&sample(-1)).unwrap_err();
        assert!(matches!(err, Error::Data { .. }));
    }

    #[test]
    fn debug_hides_password() {
        let config = ClickHouseConfig {
            password: Secret::new("hunter2"),
            ..ClickHouseConfig::default()
        };
        let store = ClickHouseStore::new(&config).unwrap();
        let rendered = format!("{store:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("localhost:8123"));
    }
}

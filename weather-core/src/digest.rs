//! Forecast memoization and HTML digest composition.

use std::{collections::BTreeMap, collections::HashMap, fmt::Write, sync::Arc};

use chrono::{FixedOffset, Offset, Utc};

use crate::{
    model::{ForecastSeries, NotificationTask, normalize_city_name},
    provider::WeatherProvider,
    registry::CityRegistry,
};

pub const DIGEST_SUBJECT: &str = "Daily weather forecast";
pub const DIGEST_TYPE: &str = "daily_forecast";
pub const WELCOME_SUBJECT: &str = "Welcome to Weather Digest!";
pub const WELCOME_TYPE: &str = "welcome";
const SENT_BY: &str = "weather_service";

/// mmHg per hPa, as used in the digest.
const MMHG_PER_HPA: f64 = 0.75;
const TIME_FORMAT: &str = "%d %b %H:%M";

/// Forecasts fetched during one dispatch cycle.
///
/// Only successes are memoized: a city whose fetch failed is fetched again
/// the next time a user asks for it.
pub struct ForecastCache {
    registry: Arc<CityRegistry>,
    provider: Arc<dyn WeatherProvider>,
    series: HashMap<String, Arc<ForecastSeries>>,
}

impl ForecastCache {
    pub fn new(registry: Arc<CityRegistry>, provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            registry,
            provider,
            series: HashMap::new(),
        }
    }

    /// Forecast for a city, or `None` when it is unregistered or the fetch failed.
    pub async fn get(&mut self, city: &str) -> Option<Arc<ForecastSeries>> {
        let key = normalize_city_name(city);
        if let Some(series) = self.series.get(&key) {
            return Some(Arc::clone(series));
        }

        let Some(coords) = self.registry.lookup(city) else {
            tracing::warn!(%city, "city is not registered, skipping");
            return None;
        };

        let fetched = match self.provider.hourly_forecast(coords).await {
            Ok(points) => ForecastSeries::from_points(points),
            Err(e) => Err(e),
        };

        match fetched {
            Ok(series) => {
                let series = Arc::new(series);
                self.series.insert(key, Arc::clone(&series));
                Some(series)
            }
            Err(e) => {
                tracing::warn!(%city, error = %e, "forecast fetch failed, skipping");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Renders digests and builds the tasks that carry them.
#[derive(Debug, Clone)]
pub struct DigestComposer {
    offset: FixedOffset,
}

impl DigestComposer {
    /// `offset` is the zone forecast times are rendered in.
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// HTML body with one section per city, in the given order.
    pub fn compose(&self, sections: &[(String, Arc<ForecastSeries>)]) -> String {
        let mut body = String::from(
            "<html>\n<body>\n<h1>Hello!</h1>\n<p>Here is your daily weather forecast:</p>\n",
        );

        for (city, series) in sections {
            let _ = write!(body, "<h2><b>{}</b></h2>\n<ul>\n", escape(city));
            for point in series.points() {
                let time = point.timestamp.with_timezone(&self.offset).format(TIME_FORMAT);
                let description = point.description.as_deref().unwrap_or("N/A");
                let _ = writeln!(
                    body,
                    "<li>{time}: {:.1}°C (feels like {:.1}°C), pressure {:.1} mmHg, wind {:.1} m/s, {}</li>",
                    point.temperature_c,
                    point.feels_like_c,
                    f64::from(point.pressure_hpa) * MMHG_PER_HPA,
                    point.wind_speed_mps,
                    escape(description),
                );
            }
            body.push_str("</ul>\n");
        }

        body.push_str("<p>Thank you for using our service!</p>\n</body>\n</html>");
        body
    }

    pub fn digest_task(&self, email: &str, body: String) -> NotificationTask {
        NotificationTask {
            to: email.to_string(),
            subject: DIGEST_SUBJECT.to_string(),
            body,
            kind: Some(DIGEST_TYPE.to_string()),
            meta: Some(sent_by()),
        }
    }

    pub fn welcome_task(&self, email: &str) -> NotificationTask {
        NotificationTask {
            to: email.to_string(),
            subject: WELCOME_SUBJECT.to_string(),
            body: "<html>\n<body>\n<h1>Welcome to Weather Digest!</h1>\n\
                   <p>Thanks for signing up. We will send you weather updates for the cities you picked.</p>\n\
                   </body>\n</html>"
                .to_string(),
            kind: Some(WELCOME_TYPE.to_string()),
            meta: Some(sent_by()),
        }
    }
}

fn sent_by() -> BTreeMap<String, serde_json::Value> {
    BTreeMap::from([("sent_by".to_string(), serde_json::Value::from(SENT_BY))])
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

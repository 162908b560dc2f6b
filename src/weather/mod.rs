/// Weather provider integration (OpenWeatherMap)
///
/// Consumed only by the landing page. Results are memoized in a single-slot
/// cache keyed by the current time floored to the configured bucket width, so
/// concurrent requests within one bucket share a single upstream fetch and a
/// bucket change replaces the slot wholesale.
use crate::config::ServerConfig;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Combined current + short-forecast weather report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub temperature: f64,
    pub feels_like: f64,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub description: String,
    pub icon: String,
    pub rain_last_hour: f64,
    pub rain_forecast: f64,
    pub rain_probability: i64,
    pub timestamp: String,
}

struct CacheSlot {
    bucket: i64,
    report: WeatherReport,
}

/// Weather fetching service with a one-entry memoized cache
pub struct WeatherService {
    config: Arc<ServerConfig>,
    client: reqwest::Client,
    cache: Mutex<Option<CacheSlot>>,
}

impl WeatherService {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            config,
            client,
            cache: Mutex::new(None),
        }
    }

    /// Get the current report, served from the cache when the bucket matches.
    ///
    /// Returns None when the provider is unconfigured or the fetch fails; the
    /// landing page degrades to no weather data.
    pub async fn get(&self) -> Option<WeatherReport> {
        let weather = match &self.config.weather {
            Some(weather) => weather,
            None => return None,
        };

        let bucket = cache_bucket(Utc::now().timestamp(), weather.cache_minutes);

        // The lock is held across the fetch so concurrent requests in the
        // same bucket reuse one upstream call.
        let mut slot = self.cache.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.bucket == bucket {
                return Some(cached.report.clone());
            }
        }

        match self.fetch_report().await {
            Some(report) => {
                *slot = Some(CacheSlot {
                    bucket,
                    report: report.clone(),
                });
                Some(report)
            }
            None => None,
        }
    }

    async fn fetch_report(&self) -> Option<WeatherReport> {
        let weather = self.config.weather.as_ref()?;

        let current = self
            .fetch_json(&format!(
                "https://api.openweathermap.org/data/2.5/weather?lat={}&lon={}&appid={}&units=metric",
                weather.latitude, weather.longitude, weather.api_key
            ))
            .await?;
        let forecast = self
            .fetch_json(&format!(
                "https://api.openweathermap.org/data/2.5/forecast?lat={}&lon={}&appid={}&units=metric",
                weather.latitude, weather.longitude, weather.api_key
            ))
            .await?;

        self.process(&current, &forecast)
    }

    async fn fetch_json(&self, url: &str) -> Option<Value> {
        match self.client.get(url).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => response.json().await.ok(),
                Err(e) => {
                    tracing::error!("Weather API error: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::error!("Weather API error: {}", e);
                None
            }
        }
    }

    /// Combine the current conditions with the first forecast entry
    /// (one 3-hour step ahead)
    fn process(&self, current: &Value, forecast: &Value) -> Option<WeatherReport> {
        let main = current.get("main")?;
        let conditions = current.get("weather")?.get(0)?;
        let next = forecast.get("list").and_then(|list| list.get(0));

        let rain_last_hour = current
            .pointer("/rain/1h")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let rain_forecast = next
            .and_then(|n| n.pointer("/rain/3h"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let rain_probability = next
            .and_then(|n| n.get("pop"))
            .and_then(Value::as_f64)
            .map(|pop| (pop * 100.0).round() as i64)
            .unwrap_or(0);

        Some(WeatherReport {
            temperature: main.get("temp")?.as_f64()?,
            feels_like: main.get("feels_like")?.as_f64()?,
            temperature_min: main.get("temp_min")?.as_f64()?,
            temperature_max: main.get("temp_max")?.as_f64()?,
            description: conditions.get("description")?.as_str()?.to_string(),
            icon: conditions.get("icon")?.as_str()?.to_string(),
            rain_last_hour,
            rain_forecast,
            rain_probability,
            timestamp: Utc::now()
                .with_timezone(&self.config.timezone)
                .to_rfc3339(),
        })
    }
}

/// Floor a unix timestamp to the start of its cache bucket
fn cache_bucket(timestamp: i64, cache_minutes: i64) -> i64 {
    let width = cache_minutes.max(1) * 60;
    timestamp - timestamp.rem_euclid(width)
}

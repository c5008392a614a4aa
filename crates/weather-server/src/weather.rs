//! Today's weather from an OpenWeather compatible endpoint, rendered as text.

use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const EMPTY_CITY_MESSAGE: &str =
    "Error: the city name must not be empty. Please provide a valid city name in English.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UNKNOWN: &str = "Unknown";
const NOT_AVAILABLE: &str = "N/A";

/// Upstream settings, read from `OPENWEATHER_API_BASE`, `API_KEY` and `USER_AGENT`
#[derive(Debug, Clone, Default)]
pub struct WeatherConfig {
    pub api_base: String,
    pub api_key: String,
    pub user_agent: String,
}

impl WeatherConfig {
    /// Unset variables are left empty; requests then fail with a readable message
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            api_base: var("OPENWEATHER_API_BASE"),
            api_key: var("API_KEY"),
            user_agent: var("USER_AGENT"),
        }
    }
}

pub struct WeatherClient {
    client: Client,
    config: WeatherConfig,
}

impl WeatherClient {
    pub fn new(config: WeatherConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    /// The `query_weather` tool: validate the city, fetch, format
    pub async fn query_weather(&self, city: &str) -> String {
        if city.trim().is_empty() {
            return EMPTY_CITY_MESSAGE.to_string();
        }
        format_weather_str(&self.fetch_weather(city).await)
    }

    /// Raw upstream body. Failures come back as a JSON object with an `error` field.
    pub async fn fetch_weather(&self, city: &str) -> String {
        debug!(city, "fetching weather");
        let response = self
            .client
            .get(&self.config.api_base)
            .query(&[
                ("q", city),
                ("appid", self.config.api_key.as_str()),
                ("units", "metric"),
                ("lang", "en"),
            ])
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        let body = match response {
            Ok(response) => response.text().await,
            Err(e) => Err(e),
        };
        match body {
            Ok(body) => body,
            Err(e) => match e.status() {
                Some(status) => json!({"error": format!("HTTP error: {}", status.as_u16())}),
                None => json!({"error": format!("Request failed: {}", e)}),
            }
            .to_string(),
        }
    }
}

/// Format a raw weather payload. Text that is not JSON yields a parse error message.
pub fn format_weather_str(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(data) => format_weather(&data),
        Err(e) => format!("Unable to parse weather data: {}", e),
    }
}

/// Render a weather payload as a short multi-line report.
///
/// A payload carrying an `error` field is reduced to that error. Missing fields
/// fall back to `Unknown` for names and `N/A` for measurements.
pub fn format_weather(data: &Value) -> String {
    if let Some(error) = data.get("error") {
        return display(Some(error), UNKNOWN);
    }

    let city = display(data.get("name"), UNKNOWN);
    let country = display(data.pointer("/sys/country"), UNKNOWN);
    let temp = display(data.pointer("/main/temp"), NOT_AVAILABLE);
    let humidity = display(data.pointer("/main/humidity"), NOT_AVAILABLE);
    let wind_speed = display(data.pointer("/wind/speed"), NOT_AVAILABLE);
    let description = display(data.pointer("/weather/0/description"), UNKNOWN);

    format!(
        "{}, {}\nTemperature: {}°C\nHumidity: {}%\nWind speed: {} m/s\nConditions: {}\n",
        city, country, temp, humidity, wind_speed, description
    )
}

fn display(value: Option<&Value>, fallback: &str) -> String {
    match value {
        None | Some(Value::Null) => fallback.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

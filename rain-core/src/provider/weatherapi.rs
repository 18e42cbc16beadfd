use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    error::PipelineError,
    model::{FetchMode, FetchRequest, RainToday, WeatherRecord},
};

use super::{WeatherFetcher, convert_cloud_to_oktas};

const BASE_URL: &str = "http://api.weatherapi.com/v1";
const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct WeatherApiFetcher {
    api_key: String,
    http: Client,
}

impl WeatherApiFetcher {
    pub fn new(api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(TIMEOUT)
            .build()
            .context("Failed to build HTTP client for WeatherAPI.com")?;
        Ok(Self { api_key, http })
    }

    async fn fetch_day(&self, request: &FetchRequest) -> Result<WeatherRecord> {
        let endpoint = endpoint(request.mode);

        let mut query = vec![
            ("key", self.api_key.clone()),
            ("q", request.city.clone()),
            ("aqi", "no".to_string()),
            ("alerts", "no".to_string()),
        ];
        match request.mode {
            FetchMode::Current => query.push(("days", "1".to_string())),
            FetchMode::Historical => {
                query.push(("dt", request.date.format("%Y-%m-%d").to_string()))
            }
        }

        tracing::debug!(city = %request.city, endpoint, "requesting WeatherAPI.com");

        let res = self
            .http
            .get(format!("{BASE_URL}/{endpoint}"))
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to WeatherAPI.com ({endpoint})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read WeatherAPI {endpoint} response body"))?;

        if !status.is_success() {
            let detail = api_error_message(&body).unwrap_or_else(|| truncate_body(&body));
            return Err(anyhow!(
                "WeatherAPI {endpoint} request failed with status {status}: {detail}"
            ));
        }

        record_from_body(&body, request.mode)
    }
}

#[async_trait]
impl WeatherFetcher for WeatherApiFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<WeatherRecord, PipelineError> {
        self.fetch_day(request).await.map_err(PipelineError::UpstreamFetch)
    }
}

fn endpoint(mode: FetchMode) -> &'static str {
    match mode {
        FetchMode::Current => "forecast.json",
        FetchMode::Historical => "history.json",
    }
}

#[derive(Debug, Deserialize)]
struct WaErrorEnvelope {
    error: WaError,
}

#[derive(Debug, Deserialize)]
struct WaError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    gust_kph: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WaDay {
    mintemp_c: Option<f64>,
    totalprecip_mm: Option<f64>,
    maxwind_kph: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WaHour {
    time: String,
    wind_kph: Option<f64>,
    humidity: Option<f64>,
    cloud: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    day: WaDay,
    #[serde(default)]
    hour: Vec<WaHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: Option<WaCurrent>,
    forecast: WaForecast,
}

/// The message of an `{"error": {...}}` body, if `body` is one.
fn api_error_message(body: &str) -> Option<String> {
    let envelope: WaErrorEnvelope = serde_json::from_str(body).ok()?;
    Some(envelope.error.message.unwrap_or_else(|| "Unknown error".to_string()))
}

/// Map a forecast/history response body onto a partial record.
fn record_from_body(body: &str, mode: FetchMode) -> Result<WeatherRecord> {
    if let Some(message) = api_error_message(body) {
        return Err(anyhow!("WeatherAPI returned error: {message}"));
    }

    let parsed: WaResponse = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse WeatherAPI {} JSON", endpoint(mode)))?;

    let day = parsed
        .forecast
        .forecastday
        .first()
        .ok_or_else(|| anyhow!("WeatherAPI response contained no forecastday data"))?;

    let wind_gust_speed = match mode {
        FetchMode::Historical => day.day.maxwind_kph,
        FetchMode::Current => {
            parsed
                .current
                .as_ref()
                .ok_or_else(|| anyhow!("WeatherAPI forecast response contained no current block"))?
                .gust_kph
        }
    };

    let h9 = hour_sample(&day.hour, 9)?;
    let h15 = hour_sample(&day.hour, 15)?;

    let rainfall = day.day.totalprecip_mm;
    Ok(WeatherRecord {
        min_temp: day.day.mintemp_c,
        rainfall,
        rain_today: rainfall.map(|mm| RainToday::Code(i64::from(mm > 0.0))),
        wind_gust_speed,
        wind_speed_9am: h9.and_then(|h| h.wind_kph),
        wind_speed_3pm: h15.and_then(|h| h.wind_kph),
        humidity_9am: h9.and_then(|h| h.humidity),
        humidity_3pm: h15.and_then(|h| h.humidity),
        cloud_9am: h9.and_then(|h| convert_cloud_to_oktas(h.cloud)),
        cloud_3pm: h15.and_then(|h| convert_cloud_to_oktas(h.cloud)),
        ..Default::default()
    })
}

/// First sample whose timestamp falls in `hour`.
fn hour_sample(hours: &[WaHour], hour: u32) -> Result<Option<&WaHour>> {
    for sample in hours {
        let time = NaiveDateTime::parse_from_str(&sample.time, "%Y-%m-%d %H:%M")
            .with_context(|| format!("Invalid hourly timestamp '{}'", sample.time))?;
        if time.hour() == hour {
            return Ok(Some(sample));
        }
    }
    Ok(None)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

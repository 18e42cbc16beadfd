use crate::{
    Config,
    error::PipelineError,
    model::{FetchRequest, WeatherRecord},
    provider::weatherapi::WeatherApiFetcher,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod weatherapi;

/// Source of observed weather for the fetch input mode.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    /// Return a partial record; fields the source cannot supply stay `None`.
    async fn fetch(&self, request: &FetchRequest) -> Result<WeatherRecord, PipelineError>;
}

/// Construct the WeatherAPI fetcher from the stored API key.
pub fn fetcher_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherFetcher>> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No WeatherAPI key configured.\n\
                 Hint: run `rain configure` and enter your API key."
        )
    })?;

    Ok(Box::new(WeatherApiFetcher::new(api_key.to_owned())?))
}

/// Convert cloud cover in percent to oktas (eighths of sky).
pub fn convert_cloud_to_oktas(percent: Option<f64>) -> Option<u8> {
    let percent = percent?;
    let oktas = match percent {
        p if p <= 0.0 => 0,
        p if p <= 12.5 => 1,
        p if p <= 25.0 => 2,
        p if p <= 37.5 => 3,
        p if p <= 50.0 => 4,
        p if p <= 62.5 => 5,
        p if p <= 75.0 => 6,
        p if p <= 87.5 => 7,
        _ => 8,
    };
    Some(oktas)
}

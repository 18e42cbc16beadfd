//! Core library for the `rain` CLI.
//!
//! This crate defines:
//! - Loading of the fitted preprocessing and classifier artifacts
//! - The inference pipeline from raw observation to rain-tomorrow prediction
//! - Input adapters for CSV tables and the WeatherAPI.com service
//! - Configuration & credentials handling
//!
//! It is used by `rain-cli`, but can also be reused by other binaries or services.

pub mod batch;
pub mod bundle;
pub mod classifier;
pub mod config;
pub mod defaults;
pub mod encoding;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod transform;

pub use batch::{BatchReport, CsvBatch};
pub use bundle::ModelBundle;
pub use classifier::ModelId;
pub use config::{Config, ProviderConfig};
pub use defaults::DefaultConfig;
pub use error::PipelineError;
pub use model::{
    FetchMode, FetchRequest, Field, PredictionResult, RainLabel, RainToday, WeatherRecord,
};
pub use pipeline::Pipeline;
pub use provider::{WeatherFetcher, fetcher_from_config};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

use crate::{classifier::ModelId, error::PipelineError};

/// Every column a weather observation can carry, named as in the training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Location,
    MinTemp,
    MaxTemp,
    Rainfall,
    Evaporation,
    Sunshine,
    WindGustDir,
    WindGustSpeed,
    WindDir9am,
    WindDir3pm,
    WindSpeed9am,
    WindSpeed3pm,
    Humidity9am,
    Humidity3pm,
    Pressure9am,
    Pressure3pm,
    Cloud9am,
    Cloud3pm,
    Temp9am,
    Temp3pm,
    RainToday,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Location => "Location",
            Field::MinTemp => "MinTemp",
            Field::MaxTemp => "MaxTemp",
            Field::Rainfall => "Rainfall",
            Field::Evaporation => "Evaporation",
            Field::Sunshine => "Sunshine",
            Field::WindGustDir => "WindGustDir",
            Field::WindGustSpeed => "WindGustSpeed",
            Field::WindDir9am => "WindDir9am",
            Field::WindDir3pm => "WindDir3pm",
            Field::WindSpeed9am => "WindSpeed9am",
            Field::WindSpeed3pm => "WindSpeed3pm",
            Field::Humidity9am => "Humidity9am",
            Field::Humidity3pm => "Humidity3pm",
            Field::Pressure9am => "Pressure9am",
            Field::Pressure3pm => "Pressure3pm",
            Field::Cloud9am => "Cloud9am",
            Field::Cloud3pm => "Cloud3pm",
            Field::Temp9am => "Temp9am",
            Field::Temp3pm => "Temp3pm",
            Field::RainToday => "RainToday",
        }
    }

    pub const fn all() -> &'static [Field] {
        &[
            Field::Location,
            Field::MinTemp,
            Field::MaxTemp,
            Field::Rainfall,
            Field::Evaporation,
            Field::Sunshine,
            Field::WindGustDir,
            Field::WindGustSpeed,
            Field::WindDir9am,
            Field::WindDir3pm,
            Field::WindSpeed9am,
            Field::WindSpeed3pm,
            Field::Humidity9am,
            Field::Humidity3pm,
            Field::Pressure9am,
            Field::Pressure3pm,
            Field::Cloud9am,
            Field::Cloud3pm,
            Field::Temp9am,
            Field::Temp3pm,
            Field::RainToday,
        ]
    }

    /// Text-valued columns that were label-encoded during training.
    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            Field::Location
                | Field::WindGustDir
                | Field::WindDir9am
                | Field::WindDir3pm
                | Field::RainToday
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Field {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Field::all()
            .iter()
            .copied()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("Unknown weather field '{value}'"))
    }
}

/// Raw `RainToday` input: either an already-encoded flag or a textual label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RainToday {
    Code(i64),
    Label(String),
}

impl RainToday {
    /// Interpret a raw cell. Integral numbers become codes, anything else stays a label.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.fract() == 0.0 && n.is_finite() => RainToday::Code(n as i64),
            _ => RainToday::Label(trimmed.to_string()),
        }
    }
}

impl fmt::Display for RainToday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RainToday::Code(code) => write!(f, "{code}"),
            RainToday::Label(label) => f.write_str(label),
        }
    }
}

/// One weather observation. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WeatherRecord {
    pub location: Option<String>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub rainfall: Option<f64>,
    pub evaporation: Option<f64>,
    pub sunshine: Option<f64>,
    pub wind_gust_dir: Option<String>,
    pub wind_gust_speed: Option<f64>,
    pub wind_dir_9am: Option<String>,
    pub wind_dir_3pm: Option<String>,
    pub wind_speed_9am: Option<f64>,
    pub wind_speed_3pm: Option<f64>,
    pub humidity_9am: Option<f64>,
    pub humidity_3pm: Option<f64>,
    pub pressure_9am: Option<f64>,
    pub pressure_3pm: Option<f64>,
    pub cloud_9am: Option<u8>,
    pub cloud_3pm: Option<u8>,
    pub temp_9am: Option<f64>,
    pub temp_3pm: Option<f64>,
    pub rain_today: Option<RainToday>,
}

/// Cell markers read as a missing value, matching the pandas CSV reader defaults.
pub const NULL_MARKERS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

impl WeatherRecord {
    /// Numeric value of a field, if the field is numeric and present.
    pub fn number(&self, field: Field) -> Option<f64> {
        match field {
            Field::MinTemp => self.min_temp,
            Field::MaxTemp => self.max_temp,
            Field::Rainfall => self.rainfall,
            Field::Evaporation => self.evaporation,
            Field::Sunshine => self.sunshine,
            Field::WindGustSpeed => self.wind_gust_speed,
            Field::WindSpeed9am => self.wind_speed_9am,
            Field::WindSpeed3pm => self.wind_speed_3pm,
            Field::Humidity9am => self.humidity_9am,
            Field::Humidity3pm => self.humidity_3pm,
            Field::Pressure9am => self.pressure_9am,
            Field::Pressure3pm => self.pressure_3pm,
            Field::Cloud9am => self.cloud_9am.map(f64::from),
            Field::Cloud3pm => self.cloud_3pm.map(f64::from),
            Field::Temp9am => self.temp_9am,
            Field::Temp3pm => self.temp_3pm,
            Field::Location
            | Field::WindGustDir
            | Field::WindDir9am
            | Field::WindDir3pm
            | Field::RainToday => None,
        }
    }

    /// Text value of a string-typed categorical field, if present.
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Location => self.location.as_deref(),
            Field::WindGustDir => self.wind_gust_dir.as_deref(),
            Field::WindDir9am => self.wind_dir_9am.as_deref(),
            Field::WindDir3pm => self.wind_dir_3pm.as_deref(),
            _ => None,
        }
    }

    pub fn is_present(&self, field: Field) -> bool {
        match field {
            Field::RainToday => self.rain_today.is_some(),
            f if f.is_categorical() => self.text(f).is_some(),
            f => self.number(f).is_some(),
        }
    }

    /// Set a field from a raw text cell. Empty cells and [`NULL_MARKERS`] leave the field absent.
    pub fn set_from_str(&mut self, field: Field, raw: &str) -> Result<(), PipelineError> {
        let raw = raw.trim();
        if raw.is_empty() || NULL_MARKERS.contains(&raw) {
            return Ok(());
        }

        let number = || {
            raw.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| PipelineError::invalid_value(field.as_str(), raw))
        };
        let oktas = || {
            let n = number()?;
            if n.fract() != 0.0 || !(0.0..=8.0).contains(&n) {
                return Err(PipelineError::invalid_value(field.as_str(), raw));
            }
            Ok(n as u8)
        };

        match field {
            Field::Location => self.location = Some(raw.to_string()),
            Field::WindGustDir => self.wind_gust_dir = Some(raw.to_string()),
            Field::WindDir9am => self.wind_dir_9am = Some(raw.to_string()),
            Field::WindDir3pm => self.wind_dir_3pm = Some(raw.to_string()),
            Field::RainToday => self.rain_today = Some(RainToday::parse(raw)),
            Field::Cloud9am => self.cloud_9am = Some(oktas()?),
            Field::Cloud3pm => self.cloud_3pm = Some(oktas()?),
            Field::MinTemp => self.min_temp = Some(number()?),
            Field::MaxTemp => self.max_temp = Some(number()?),
            Field::Rainfall => self.rainfall = Some(number()?),
            Field::Evaporation => self.evaporation = Some(number()?),
            Field::Sunshine => self.sunshine = Some(number()?),
            Field::WindGustSpeed => self.wind_gust_speed = Some(number()?),
            Field::WindSpeed9am => self.wind_speed_9am = Some(number()?),
            Field::WindSpeed3pm => self.wind_speed_3pm = Some(number()?),
            Field::Humidity9am => self.humidity_9am = Some(number()?),
            Field::Humidity3pm => self.humidity_3pm = Some(number()?),
            Field::Pressure9am => self.pressure_9am = Some(number()?),
            Field::Pressure3pm => self.pressure_3pm = Some(number()?),
            Field::Temp9am => self.temp_9am = Some(number()?),
            Field::Temp3pm => self.temp_3pm = Some(number()?),
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RainLabel {
    No,
    Yes,
}

impl RainLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RainLabel::No => "No",
            RainLabel::Yes => "Yes",
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            RainLabel::No => 0,
            RainLabel::Yes => 1,
        }
    }
}

impl fmt::Display for RainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub model: ModelId,
    pub label: RainLabel,
    pub probability_no: f64,
    pub probability_yes: f64,
    /// Accuracy on held-out data, recorded when the model was trained.
    pub model_accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Current,
    Historical,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub city: String,
    pub date: NaiveDate,
    pub mode: FetchMode,
}

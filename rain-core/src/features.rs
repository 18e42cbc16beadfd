//! Projection of a record onto the columns the models were fitted on.

use std::fmt;

use crate::{
    error::{PipelineError, Result},
    model::{Field, RainToday, WeatherRecord},
};

pub const FEATURE_COUNT: usize = 10;

/// Column order the scaler, reducer and classifiers were fitted on. Do not reorder.
pub const SELECTED_FEATURES: [Field; FEATURE_COUNT] = [
    Field::Humidity3pm,
    Field::RainToday,
    Field::Cloud3pm,
    Field::Humidity9am,
    Field::Cloud9am,
    Field::Rainfall,
    Field::WindGustSpeed,
    Field::WindSpeed9am,
    Field::WindSpeed3pm,
    Field::MinTemp,
];

/// A projected cell, before categorical encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(n) => write!(f, "{n}"),
            FeatureValue::Text(s) => f.write_str(s),
        }
    }
}

/// The selected features of one record, in [`SELECTED_FEATURES`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow(pub [FeatureValue; FEATURE_COUNT]);

impl FeatureRow {
    pub fn iter(&self) -> impl Iterator<Item = (Field, &FeatureValue)> {
        SELECTED_FEATURES.iter().copied().zip(self.0.iter())
    }
}

fn cell(record: &WeatherRecord, field: Field) -> Option<FeatureValue> {
    match field {
        Field::RainToday => record.rain_today.as_ref().map(|value| match value {
            RainToday::Code(code) => FeatureValue::Number(*code as f64),
            RainToday::Label(label) => FeatureValue::Text(label.clone()),
        }),
        f if f.is_categorical() => record.text(f).map(|s| FeatureValue::Text(s.to_string())),
        f => record.number(f).map(FeatureValue::Number),
    }
}

/// Select the model columns of `record`, failing on every absent one.
pub fn project(record: &WeatherRecord) -> Result<FeatureRow> {
    let mut values = Vec::with_capacity(FEATURE_COUNT);
    let mut missing = Vec::new();
    for field in SELECTED_FEATURES {
        match cell(record, field) {
            Some(value) => values.push(value),
            None => missing.push(field.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::missing(missing));
    }

    let values: [FeatureValue; FEATURE_COUNT] =
        values.try_into().map_err(|values: Vec<FeatureValue>| PipelineError::Transform {
            stage: "projector",
            expected: FEATURE_COUNT,
            actual: values.len(),
        })?;
    Ok(FeatureRow(values))
}

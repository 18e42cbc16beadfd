//! Label encoding of categorical weather fields.

use anyhow::anyhow;
use std::collections::{BTreeMap, HashMap};

use crate::{
    error::{PipelineError, Result},
    features::{FEATURE_COUNT, FeatureRow, FeatureValue},
    model::{Field, WeatherRecord},
};

/// Trained vocabulary of one field. A label's code is its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    labels: Vec<String>,
    codes: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn new(labels: Vec<String>) -> Self {
        let codes = labels.iter().enumerate().map(|(code, label)| (label.clone(), code)).collect();
        Self { labels, codes }
    }

    pub fn code(&self, label: &str) -> Option<usize> {
        self.codes.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Per-field vocabularies fitted during training.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoricalEncoder {
    vocabularies: BTreeMap<Field, Vocabulary>,
}

impl CategoricalEncoder {
    /// Build from the raw `field name -> labels` table stored with the models.
    pub fn from_tables(tables: HashMap<String, Vec<String>>) -> anyhow::Result<Self> {
        let mut vocabularies = BTreeMap::new();
        for (name, labels) in tables {
            let field = Field::try_from(name.as_str())?;
            if !field.is_categorical() {
                return Err(anyhow!("Encoder registered for non-categorical field '{field}'"));
            }
            if labels.is_empty() {
                return Err(anyhow!("Encoder for '{field}' has an empty vocabulary"));
            }
            vocabularies.insert(field, Vocabulary::new(labels));
        }
        Ok(Self { vocabularies })
    }

    pub fn vocabulary(&self, field: Field) -> Option<&Vocabulary> {
        self.vocabularies.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.vocabularies.keys().copied()
    }

    /// Translate one label through the field's vocabulary.
    pub fn encode_label(&self, field: Field, label: &str) -> Result<usize> {
        let vocabulary = self.vocabularies.get(&field).ok_or_else(|| PipelineError::Encoding {
            field: field.as_str().to_string(),
            reason: format!("text value '{label}' in a column without a trained encoder"),
        })?;
        vocabulary.code(label).ok_or_else(|| PipelineError::unknown_category(field.as_str(), label))
    }

    /// Reject records whose categorical fields fall outside the trained vocabularies.
    ///
    /// `RainToday` is skipped here; it follows the fixed Yes/No rule in [`encode_rain_today`].
    pub fn validate(&self, record: &WeatherRecord) -> Result<()> {
        for (field, _) in self.vocabularies.iter().filter(|(f, _)| **f != Field::RainToday) {
            if let Some(value) = record.text(*field) {
                self.encode_label(*field, value)?;
            }
        }
        Ok(())
    }

    /// Validate `record` and turn its projected features into model input.
    pub fn encode(&self, record: &WeatherRecord, row: &FeatureRow) -> Result<[f64; FEATURE_COUNT]> {
        self.validate(record)?;

        let mut encoded = [0.0; FEATURE_COUNT];
        for (slot, (field, value)) in encoded.iter_mut().zip(row.iter()) {
            *slot = match (field, value) {
                (Field::RainToday, value) => encode_rain_today(Some(value))?,
                (_, FeatureValue::Number(n)) => *n,
                (field, FeatureValue::Text(label)) => self.encode_label(field, label)? as f64,
            };
        }
        Ok(encoded)
    }
}

/// `"Yes"`/`"No"` (any case) map to 1/0 and numeric 0/1 pass through.
pub fn encode_rain_today(value: Option<&FeatureValue>) -> Result<f64> {
    let field = Field::RainToday.as_str();
    match value {
        None => Err(PipelineError::Encoding {
            field: field.to_string(),
            reason: "value is missing after default filling".to_string(),
        }),
        Some(FeatureValue::Number(n)) if *n == 0.0 || *n == 1.0 => Ok(*n),
        Some(FeatureValue::Number(n)) => Err(PipelineError::unknown_category(field, n.to_string())),
        Some(FeatureValue::Text(label)) => match label.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(1.0),
            "no" => Ok(0.0),
            _ => Err(PipelineError::unknown_category(field, label.as_str())),
        },
    }
}

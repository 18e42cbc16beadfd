//! Error taxonomy for the prediction pipeline.

use thiserror::Error;

/// Errors raised while turning a weather record into a prediction.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// One or more of the selected feature columns is absent.
    #[error("missing required feature column(s): {}", fields.join(", "))]
    MissingFeature { fields: Vec<String> },

    /// A categorical value outside the vocabulary seen during training.
    #[error("unknown category '{value}' for field '{field}'")]
    UnknownCategory { field: String, value: String },

    #[error("unknown model '{0}'. Supported models: forest, tree.")]
    UnknownModel(String),

    /// Scaler or reducer applied to a matrix of the wrong width.
    #[error("{stage} expected {expected} feature column(s), got {actual}")]
    Transform {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("weather fetch failed: {0:#}")]
    UpstreamFetch(#[source] anyhow::Error),

    /// A value that cannot be turned into a number for the model.
    #[error("cannot encode field '{field}': {reason}")]
    Encoding { field: String, reason: String },

    /// An input cell that does not parse as the field's type.
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },

    /// A CSV row with more cells than the header has columns.
    #[error("row has {actual} cell(s) but the header has {expected} column(s)")]
    RowLength { expected: usize, actual: usize },

    #[error("malformed CSV input: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

impl PipelineError {
    pub fn missing<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipelineError::MissingFeature { fields: fields.into_iter().map(Into::into).collect() }
    }

    pub fn unknown_category(field: impl Into<String>, value: impl Into<String>) -> Self {
        PipelineError::UnknownCategory { field: field.into(), value: value.into() }
    }

    pub fn invalid_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        PipelineError::InvalidValue { field: field.into(), value: value.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_feature_names_every_column() {
        let err = PipelineError::missing(["Humidity3pm", "Cloud9am"]);
        assert_eq!(
            err.to_string(),
            "missing required feature column(s): Humidity3pm, Cloud9am"
        );
    }

    #[test]
    fn unknown_category_names_field_and_value() {
        let err = PipelineError::unknown_category("WindGustDir", "ZZZ");
        assert_eq!(err.to_string(), "unknown category 'ZZZ' for field 'WindGustDir'");
    }

    #[test]
    fn unknown_model_lists_supported_models() {
        let err = PipelineError::UnknownModel("svm".into());
        assert!(err.to_string().contains("Supported models: forest, tree"));
    }

    #[test]
    fn transform_error_reports_shapes() {
        let err = PipelineError::Transform { stage: "scaler", expected: 10, actual: 9 };
        assert_eq!(err.to_string(), "scaler expected 10 feature column(s), got 9");
    }

    #[test]
    fn row_length_reports_both_widths() {
        let err = PipelineError::RowLength { expected: 11, actual: 12 };
        assert_eq!(err.to_string(), "row has 12 cell(s) but the header has 11 column(s)");
    }

    #[test]
    fn upstream_fetch_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("Failed to send request");
        let err = PipelineError::UpstreamFetch(inner);
        let msg = err.to_string();
        assert!(msg.contains("Failed to send request"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<E: std::error::Error + Send + Sync + 'static>() {}
        assert_std_error::<PipelineError>();
    }
}

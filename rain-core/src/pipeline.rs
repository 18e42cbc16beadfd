//! Default-fill, projection, encoding, transform and prediction in one place.

use ndarray::{Array2, ArrayView2};
use std::sync::Arc;

use crate::{
    batch::{BatchReport, BatchRow, CsvBatch, RowFailure},
    bundle::ModelBundle,
    classifier::{self, ModelId},
    defaults::DefaultConfig,
    error::{PipelineError, Result},
    features::{FEATURE_COUNT, project},
    model::{FetchRequest, PredictionResult, WeatherRecord},
    provider::WeatherFetcher,
};

/// Entry point for predictions. Cheap to clone; the bundle is shared.
#[derive(Debug, Clone)]
pub struct Pipeline {
    bundle: Arc<ModelBundle>,
    defaults: Arc<DefaultConfig>,
}

impl Pipeline {
    pub fn new(bundle: Arc<ModelBundle>, defaults: DefaultConfig) -> Self {
        Self { bundle, defaults: Arc::new(defaults) }
    }

    /// Fill, project and encode one record into model input.
    pub fn prepare(&self, record: WeatherRecord) -> Result<[f64; FEATURE_COUNT]> {
        let filled = self.defaults.fill(record);
        let row = project(&filled)?;
        self.bundle.encoders().encode(&filled, &row)
    }

    /// Predict a single record. Any failure fails the whole request.
    pub fn predict_record(
        &self,
        record: WeatherRecord,
        model: ModelId,
    ) -> Result<PredictionResult> {
        let encoded = self.prepare(record)?;
        let x = Array2::from(vec![encoded]);
        let result = self
            .predict_matrix(x.view(), model)?
            .into_iter()
            .next()
            .ok_or(PipelineError::Transform { stage: "classifier", expected: 1, actual: 0 })?;
        tracing::debug!(
            %model,
            label = %result.label,
            p_yes = result.probability_yes,
            "predicted record"
        );
        Ok(result)
    }

    /// Predict many independent records, keeping each row's error in its slot.
    pub fn predict_records(
        &self,
        records: Vec<WeatherRecord>,
        model: ModelId,
    ) -> Result<Vec<Result<PredictionResult>>> {
        self.predict_parsed(records.into_iter().map(Ok).collect(), model)
    }

    /// Predict every row of a CSV table. Rejected rows are reported, never fatal.
    pub fn predict_batch(&self, batch: &CsvBatch, model: ModelId) -> Result<BatchReport> {
        let outcomes = self.predict_parsed(batch.records(), model)?;

        let mut rows = Vec::new();
        let mut failures = Vec::new();
        for (index, (outcome, fields)) in outcomes.into_iter().zip(batch.rows()).enumerate() {
            let row = index + 1;
            match outcome {
                Ok(prediction) => rows.push(BatchRow { row, fields: fields.clone(), prediction }),
                Err(error) => {
                    tracing::warn!(row, %error, "rejected batch row");
                    failures.push(RowFailure { row, error });
                }
            }
        }

        tracing::info!(
            %model,
            accepted = rows.len(),
            rejected = failures.len(),
            "batch prediction finished"
        );
        Ok(BatchReport { columns: batch.headers().to_vec(), rows, failures })
    }

    /// Fetch an observation and predict from it. Returns the fetched record as well.
    pub async fn predict_fetched(
        &self,
        fetcher: &dyn WeatherFetcher,
        request: &FetchRequest,
        model: ModelId,
    ) -> Result<(WeatherRecord, PredictionResult)> {
        let record = fetcher.fetch(request).await.inspect_err(|error| {
            tracing::warn!(city = %request.city, %error, "weather fetch failed");
        })?;
        let prediction = self.predict_record(record.clone(), model)?;
        Ok((record, prediction))
    }

    fn predict_parsed(
        &self,
        records: Vec<Result<WeatherRecord>>,
        model: ModelId,
    ) -> Result<Vec<Result<PredictionResult>>> {
        let prepared: Vec<Result<[f64; FEATURE_COUNT]>> =
            records.into_iter().map(|record| record.and_then(|r| self.prepare(r))).collect();

        let accepted: Vec<[f64; FEATURE_COUNT]> =
            prepared.iter().filter_map(|p| p.as_ref().ok()).copied().collect();
        let mut predictions =
            self.predict_matrix(Array2::from(accepted).view(), model)?.into_iter();

        Ok(prepared
            .into_iter()
            .map(|p| {
                p.and_then(|_| {
                    predictions.next().ok_or(PipelineError::Transform {
                        stage: "classifier",
                        expected: 1,
                        actual: 0,
                    })
                })
            })
            .collect())
    }

    fn predict_matrix(&self, x: ArrayView2<f64>, model: ModelId) -> Result<Vec<PredictionResult>> {
        let reduced = self.bundle.chain().apply(x)?;
        let predictions = classifier::predict(self.bundle.classifier(model), reduced.view())?;
        let model_accuracy = self.bundle.accuracy().for_model(model);

        Ok(predictions
            .into_iter()
            .map(|p| PredictionResult {
                model,
                label: p.label,
                probability_no: p.probability_no,
                probability_yes: p.probability_yes,
                model_accuracy,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bundle::tests::fixture_bundle,
        model::{FetchMode, RainLabel, RainToday},
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn pipeline() -> Pipeline {
        Pipeline::new(Arc::new(fixture_bundle()), DefaultConfig::default())
    }

    fn default_inputs() -> WeatherRecord {
        WeatherRecord {
            humidity_3pm: Some(52.0),
            rain_today: Some(RainToday::Label("No".into())),
            cloud_3pm: Some(5),
            humidity_9am: Some(70.0),
            cloud_9am: Some(5),
            rainfall: Some(0.0),
            wind_gust_speed: Some(39.0),
            wind_speed_9am: Some(13.0),
            wind_speed_3pm: Some(19.0),
            min_temp: Some(12.0),
            ..Default::default()
        }
    }

    fn wet_inputs() -> WeatherRecord {
        WeatherRecord {
            humidity_3pm: Some(92.0),
            rain_today: Some(RainToday::Label("Yes".into())),
            cloud_3pm: Some(8),
            humidity_9am: Some(89.0),
            ..Default::default()
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn default_configuration_is_a_stable_fixture() {
        let pipeline = pipeline();
        let first = pipeline.predict_record(default_inputs(), ModelId::Forest).unwrap();

        assert_eq!(first.label, RainLabel::No);
        assert_close(first.probability_yes, 0.15);
        assert_close(first.probability_no, 0.85);
        assert_eq!(first.model_accuracy, 0.8512);

        for _ in 0..5 {
            let again = pipeline.predict_record(default_inputs(), ModelId::Forest).unwrap();
            assert_eq!(again.probability_yes.to_bits(), first.probability_yes.to_bits());
            assert_eq!(again.label, first.label);
        }
    }

    #[test]
    fn empty_record_predicts_from_defaults() {
        let pipeline = pipeline();
        let from_empty = pipeline.predict_record(WeatherRecord::default(), ModelId::Tree).unwrap();
        let from_defaults = pipeline.predict_record(default_inputs(), ModelId::Tree).unwrap();
        assert_eq!(from_empty, from_defaults);
        assert_close(from_empty.probability_yes, 0.2);
    }

    #[test]
    fn humid_cloudy_day_predicts_rain() {
        let pipeline = pipeline();

        let forest = pipeline.predict_record(wet_inputs(), ModelId::Forest).unwrap();
        assert_eq!(forest.label, RainLabel::Yes);
        assert_close(forest.probability_yes, 0.65);

        let tree = pipeline.predict_record(wet_inputs(), ModelId::Tree).unwrap();
        assert_eq!(tree.label, RainLabel::Yes);
        assert_close(tree.probability_yes, 0.7);
        assert_eq!(tree.model_accuracy, 0.7894);
    }

    #[test]
    fn strong_gusts_push_the_tree_further() {
        let record = WeatherRecord { wind_gust_speed: Some(78.0), ..wet_inputs() };
        let tree = pipeline().predict_record(record, ModelId::Tree).unwrap();
        assert_close(tree.probability_yes, 0.9);
    }

    #[test]
    fn probabilities_always_sum_to_one() {
        let pipeline = pipeline();
        for record in [default_inputs(), wet_inputs(), WeatherRecord::default()] {
            for model in ModelId::all() {
                let result = pipeline.predict_record(record.clone(), *model).unwrap();
                assert!((result.probability_no + result.probability_yes - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn unknown_category_fails_single_prediction() {
        let record = WeatherRecord { wind_gust_dir: Some("ZZZ".into()), ..default_inputs() };
        let err = pipeline().predict_record(record, ModelId::Forest).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownCategory { ref value, .. } if value == "ZZZ"));
    }

    #[test]
    fn unknown_rain_today_label_is_rejected() {
        let record = WeatherRecord {
            rain_today: Some(RainToday::Label("Drizzle".into())),
            ..default_inputs()
        };
        let err = pipeline().predict_record(record, ModelId::Tree).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnknownCategory { ref field, .. } if field == "RainToday"
        ));
    }

    #[test]
    fn records_keep_their_errors_in_place() {
        let records = vec![
            default_inputs(),
            WeatherRecord { location: Some("Atlantis".into()), ..default_inputs() },
            wet_inputs(),
        ];
        let results = pipeline().predict_records(records, ModelId::Forest).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().label, RainLabel::No);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().label, RainLabel::Yes);
    }

    #[test]
    fn batch_isolates_the_invalid_row() {
        let csv = "\
Location,Humidity3pm,RainToday,Cloud3pm,Humidity9am,Cloud9am,Rainfall,WindGustSpeed,WindSpeed9am,WindSpeed3pm,MinTemp,WindGustDir
Sydney,52,No,5,70,5,0,39,13,19,12,NW
Sydney,92,Yes,8,89,5,3.4,39,13,19,12,SSE
Perth,60,No,4,65,3,0,41,9,15,14,INVALID
Albury,,,,,,,,,,,
Hobart,88,yes,7,95,8,12.0,30,6,11,8,W
";
        let batch = CsvBatch::from_reader(csv.as_bytes()).unwrap();
        let report = pipeline().predict_batch(&batch, ModelId::Forest).unwrap();

        assert_eq!(report.total(), 5);
        assert_eq!(report.rows.len(), 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].row, 3);
        assert!(matches!(
            report.failures[0].error,
            PipelineError::UnknownCategory { ref field, .. } if field == "WindGustDir"
        ));
        assert_eq!(
            report.rows.iter().map(|r| r.row).collect::<Vec<_>>(),
            vec![1, 2, 4, 5]
        );
        assert_eq!(report.rows[1].prediction.label, RainLabel::Yes);
    }

    const BATCH_HEADER: &str = "Location,Humidity3pm,RainToday,Cloud3pm,Humidity9am,Cloud9am,\
Rainfall,WindGustSpeed,WindSpeed9am,WindSpeed3pm,MinTemp,WindGustDir";

    #[test]
    fn null_markers_are_filled_not_rejected() {
        let csv = format!(
            "{BATCH_HEADER}\n\
             Sydney,52,No,NA,70,5,0,39,13,19,12,NW\n\
             Sydney,52,No,5,70,5,0,39,13,19,12,NA\n"
        );
        let batch = CsvBatch::from_reader(csv.as_bytes()).unwrap();
        let report = pipeline().predict_batch(&batch, ModelId::Tree).unwrap();

        assert_eq!(report.rows.len(), 2);
        assert!(report.failures.is_empty());
        let defaults = pipeline().predict_record(default_inputs(), ModelId::Tree).unwrap();
        for row in &report.rows {
            assert_eq!(row.prediction, defaults);
        }
    }

    #[test]
    fn short_row_does_not_abort_the_batch() {
        let csv = format!(
            "{BATCH_HEADER}\n\
             Sydney,52,No,5,70,5,0,39,13,19,12,NW\n\
             Sydney,92,Yes,8,89,5,3.4,39,13,19,12\n\
             Perth,60,No,4,65,3,0,41,9,15,14,W\n"
        );
        let batch = CsvBatch::from_reader(csv.as_bytes()).unwrap();
        let report = pipeline().predict_batch(&batch, ModelId::Forest).unwrap();

        assert_eq!(report.rows.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.rows[1].prediction.label, RainLabel::Yes);

        let mut out = Vec::new();
        report.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn long_row_fails_alone() {
        let csv = format!(
            "{BATCH_HEADER}\n\
             Sydney,52,No,5,70,5,0,39,13,19,12,NW\n\
             Sydney,52,No,5,70,5,0,39,13,19,12,NW,surplus\n\
             Perth,60,No,4,65,3,0,41,9,15,14,W\n"
        );
        let batch = CsvBatch::from_reader(csv.as_bytes()).unwrap();
        let report = pipeline().predict_batch(&batch, ModelId::Forest).unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].row, 2);
        assert!(matches!(report.failures[0].error, PipelineError::RowLength { .. }));
    }

    #[test]
    fn batch_export_appends_prediction_columns() {
        let csv = "\
Date,Humidity3pm,RainToday,Cloud3pm,Humidity9am,Cloud9am,Rainfall,WindGustSpeed,WindSpeed9am,WindSpeed3pm,MinTemp
2024-03-01,52,0,5,70,5,0,39,13,19,12
";
        let batch = CsvBatch::from_reader(csv.as_bytes()).unwrap();
        let report = pipeline().predict_batch(&batch, ModelId::Tree).unwrap();

        let mut out = Vec::new();
        report.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Date,Humidity3pm,RainToday,Cloud3pm,Humidity9am,Cloud9am,Rainfall,WindGustSpeed,WindSpeed9am,WindSpeed3pm,MinTemp,Prediction,PredictionLabel,ProbabilityNo,ProbabilityYes"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2024-03-01,52,0,5,70,5,0,39,13,19,12,0,No,0.800000,0.200000"
        );
        assert!(lines.next().is_none());
    }

    #[derive(Debug)]
    struct StubFetcher(std::result::Result<WeatherRecord, String>);

    #[async_trait]
    impl WeatherFetcher for StubFetcher {
        async fn fetch(&self, _request: &FetchRequest) -> Result<WeatherRecord> {
            self.0
                .clone()
                .map_err(|msg| PipelineError::UpstreamFetch(anyhow::anyhow!(msg)))
        }
    }

    fn request() -> FetchRequest {
        FetchRequest {
            city: "Sydney".into(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            mode: FetchMode::Current,
        }
    }

    #[tokio::test]
    async fn fetched_record_flows_through_the_pipeline() {
        let fetched = WeatherRecord {
            rain_today: Some(RainToday::Code(1)),
            humidity_3pm: Some(92.0),
            humidity_9am: Some(89.0),
            cloud_3pm: Some(8),
            cloud_9am: None,
            ..Default::default()
        };
        let fetcher = StubFetcher(Ok(fetched.clone()));

        let (record, result) =
            pipeline().predict_fetched(&fetcher, &request(), ModelId::Forest).await.unwrap();
        assert_eq!(record, fetched);
        assert_eq!(result.label, RainLabel::Yes);
    }

    #[tokio::test]
    async fn fetch_failure_is_surfaced() {
        let fetcher = StubFetcher(Err("503 Service Unavailable".into()));
        let err = pipeline()
            .predict_fetched(&fetcher, &request(), ModelId::Forest)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamFetch(_)));
        assert!(err.to_string().contains("503"));
    }
}

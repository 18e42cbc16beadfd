//! CSV ingestion and export for batch prediction.

use std::io::{Read, Write};

use crate::{
    error::{PipelineError, Result},
    features::SELECTED_FEATURES,
    model::{Field, PredictionResult, WeatherRecord},
};

/// Columns appended to each exported row.
pub const PREDICTION_COLUMNS: [&str; 4] =
    ["Prediction", "PredictionLabel", "ProbabilityNo", "ProbabilityYes"];

/// A CSV table of observations, kept as raw text so every column can be echoed back.
#[derive(Debug, Clone)]
pub struct CsvBatch {
    headers: Vec<String>,
    /// The weather field behind each column, if any.
    columns: Vec<Option<Field>>,
    rows: Vec<Vec<String>>,
}

impl CsvBatch {
    /// Read a table with a header row. Every selected feature must have a column.
    ///
    /// Short rows are padded with empty cells. Long rows are kept and fail on parse.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr =
            csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let columns: Vec<Option<Field>> =
            headers.iter().map(|h| Field::try_from(h.as_str()).ok()).collect();

        let missing: Vec<&str> = SELECTED_FEATURES
            .iter()
            .filter(|field| !columns.contains(&Some(**field)))
            .map(|field| field.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::missing(missing));
        }

        let width = headers.len();
        let rows = rdr
            .records()
            .map(|record| {
                record.map(|r| {
                    let mut cells: Vec<String> = r.iter().map(str::to_string).collect();
                    if cells.len() < width {
                        cells.resize(width, String::new());
                    }
                    cells
                })
            })
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;

        tracing::debug!(columns = headers.len(), rows = rows.len(), "read CSV batch");
        Ok(Self { headers, columns, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse each row into a record. A bad cell fails its row only.
    pub fn records(&self) -> Vec<Result<WeatherRecord>> {
        self.rows.iter().map(|row| self.parse_row(row)).collect()
    }

    fn parse_row(&self, row: &[String]) -> Result<WeatherRecord> {
        if row.len() > self.headers.len() {
            return Err(PipelineError::RowLength {
                expected: self.headers.len(),
                actual: row.len(),
            });
        }
        let mut record = WeatherRecord::default();
        for (field, cell) in self.columns.iter().zip(row) {
            if let Some(field) = field {
                record.set_from_str(*field, cell)?;
            }
        }
        Ok(record)
    }
}

/// A successfully predicted row with its original cells.
#[derive(Debug, Clone)]
pub struct BatchRow {
    /// 1-based data row number.
    pub row: usize,
    pub fields: Vec<String>,
    pub prediction: PredictionResult,
}

#[derive(Debug)]
pub struct RowFailure {
    /// 1-based data row number.
    pub row: usize,
    pub error: PipelineError,
}

/// Result of a batch run. Every input row is either in `rows` or in `failures`.
#[derive(Debug)]
pub struct BatchReport {
    pub columns: Vec<String>,
    pub rows: Vec<BatchRow>,
    pub failures: Vec<RowFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.rows.len() + self.failures.len()
    }

    /// Write the original columns plus the prediction columns for each accepted row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let header = self.columns.iter().map(String::as_str).chain(PREDICTION_COLUMNS);
        wtr.write_record(header)?;

        for row in &self.rows {
            let p = &row.prediction;
            let extra = [
                p.label.code().to_string(),
                p.label.as_str().to_string(),
                format!("{:.6}", p.probability_no),
                format!("{:.6}", p.probability_yes),
            ];
            let cells = row.fields.iter().chain(extra.iter()).map(String::as_str);
            wtr.write_record(cells)?;
        }

        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

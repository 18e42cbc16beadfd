use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select, Text};
use rain_core::{
    Config, CsvBatch, FetchMode, FetchRequest, Field, ModelBundle, ModelId, Pipeline,
    PredictionResult, RainToday, WeatherRecord, fetcher_from_config,
};
use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::PathBuf,
    sync::Arc,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "rain", version, about = "Predict whether it will rain tomorrow")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set the WeatherAPI key, artifact directory and default model.
    Configure,

    /// Predict from values given on the command line. Omitted fields use defaults.
    Predict {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        input: ManualInput,
    },

    /// Predict every row of a CSV file.
    Batch {
        /// CSV file with a header row.
        input: PathBuf,

        /// Write the augmented table here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Fetch observed weather for a city from WeatherAPI.com and predict.
    Fetch {
        /// City name, e.g. "Sydney".
        city: String,

        /// Day to fetch (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Use the history endpoint for `--date` instead of today's forecast.
        #[arg(long)]
        historical: bool,

        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    /// Classifier to use: forest or tree.
    #[arg(long)]
    model: Option<String>,

    /// Directory holding the model artifacts.
    #[arg(long)]
    artifacts: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ManualInput {
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    min_temp: Option<f64>,
    #[arg(long)]
    max_temp: Option<f64>,
    #[arg(long)]
    rainfall: Option<f64>,
    #[arg(long)]
    evaporation: Option<f64>,
    #[arg(long)]
    sunshine: Option<f64>,
    #[arg(long)]
    wind_gust_dir: Option<String>,
    #[arg(long)]
    wind_gust_speed: Option<f64>,
    #[arg(long)]
    wind_dir_9am: Option<String>,
    #[arg(long)]
    wind_dir_3pm: Option<String>,
    #[arg(long)]
    wind_speed_9am: Option<f64>,
    #[arg(long)]
    wind_speed_3pm: Option<f64>,
    #[arg(long)]
    humidity_9am: Option<f64>,
    #[arg(long)]
    humidity_3pm: Option<f64>,
    #[arg(long)]
    pressure_9am: Option<f64>,
    #[arg(long)]
    pressure_3pm: Option<f64>,
    /// Cloud cover in oktas (0-8).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=8))]
    cloud_9am: Option<u8>,
    /// Cloud cover in oktas (0-8).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=8))]
    cloud_3pm: Option<u8>,
    #[arg(long)]
    temp_9am: Option<f64>,
    #[arg(long)]
    temp_3pm: Option<f64>,
    /// Yes or No.
    #[arg(long)]
    rain_today: Option<String>,
}

impl From<ManualInput> for WeatherRecord {
    fn from(input: ManualInput) -> Self {
        WeatherRecord {
            location: input.location,
            min_temp: input.min_temp,
            max_temp: input.max_temp,
            rainfall: input.rainfall,
            evaporation: input.evaporation,
            sunshine: input.sunshine,
            wind_gust_dir: input.wind_gust_dir,
            wind_gust_speed: input.wind_gust_speed,
            wind_dir_9am: input.wind_dir_9am,
            wind_dir_3pm: input.wind_dir_3pm,
            wind_speed_9am: input.wind_speed_9am,
            wind_speed_3pm: input.wind_speed_3pm,
            humidity_9am: input.humidity_9am,
            humidity_3pm: input.humidity_3pm,
            pressure_9am: input.pressure_9am,
            pressure_3pm: input.pressure_3pm,
            cloud_9am: input.cloud_9am,
            cloud_3pm: input.cloud_3pm,
            temp_9am: input.temp_9am,
            temp_3pm: input.temp_3pm,
            rain_today: input.rain_today.as_deref().map(RainToday::parse),
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Predict { model, input } => {
                let config = Config::load()?;
                let (pipeline, model) = setup(&config, &model)?;

                let result = pipeline.predict_record(input.into(), model)?;
                print_prediction(&result);
                Ok(())
            }
            Command::Batch { input, output, model } => {
                let config = Config::load()?;
                let (pipeline, model) = setup(&config, &model)?;

                let file = File::open(&input)
                    .with_context(|| format!("Failed to open input file: {}", input.display()))?;
                let batch = CsvBatch::from_reader(BufReader::new(file))?;
                let report = pipeline.predict_batch(&batch, model)?;

                match &output {
                    Some(path) => {
                        let out = File::create(path).with_context(|| {
                            format!("Failed to create output file: {}", path.display())
                        })?;
                        report.write_csv(BufWriter::new(out))?;
                    }
                    None => report.write_csv(io::stdout().lock())?,
                }

                // stdout may hold the table; the subscriber writes to stderr.
                // Rejected rows were already logged one by one by the pipeline.
                tracing::info!(
                    input = %input.display(),
                    accepted = report.rows.len(),
                    rejected = report.failures.len(),
                    "{} of {} row(s) predicted with {}",
                    report.rows.len(),
                    report.total(),
                    model.display_name()
                );
                if let Some(path) = &output {
                    tracing::info!(output = %path.display(), "wrote predictions");
                }
                Ok(())
            }
            Command::Fetch { city, date, historical, model } => {
                let config = Config::load()?;
                let (pipeline, model) = setup(&config, &model)?;
                let fetcher = fetcher_from_config(&config)?;

                let request = FetchRequest {
                    city,
                    date: date.unwrap_or_else(|| Local::now().date_naive()),
                    mode: if historical { FetchMode::Historical } else { FetchMode::Current },
                };

                let (record, result) =
                    pipeline.predict_fetched(fetcher.as_ref(), &request, model).await?;

                println!("Weather data fetched for {} on {}:", request.city, request.date);
                print_record(&record);
                println!();
                print_prediction(&result);
                Ok(())
            }
        }
    }
}

/// Resolve the model and load the artifacts for a prediction command.
fn setup(config: &Config, args: &ModelArgs) -> Result<(Pipeline, ModelId)> {
    let model = match &args.model {
        Some(name) => ModelId::try_from(name.as_str())?,
        None => config.default_model_id()?,
    };

    let dir = args.artifacts.as_deref().unwrap_or_else(|| config.artifacts_dir_or_default());
    let bundle = ModelBundle::load(dir).map_err(|e| {
        e.context(
            "Hint: pass `--artifacts <DIR>` or run `rain configure` to set the artifact directory",
        )
    })?;

    Ok((Pipeline::new(Arc::new(bundle), config.default_config()), model))
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("WeatherAPI.com API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key")
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.set_api_key(api_key.trim().to_string());
    }

    let current_dir = config.artifacts_dir_or_default().display().to_string();
    let artifacts = Text::new("Model artifact directory:").with_default(&current_dir).prompt()?;
    config.artifacts_dir = Some(PathBuf::from(artifacts.trim()));

    let current_model = config.default_model_id().unwrap_or(ModelId::Forest);
    let starting = ModelId::all().iter().position(|id| *id == current_model).unwrap_or(0);
    let model = Select::new("Default model:", ModelId::all().to_vec())
        .with_starting_cursor(starting)
        .prompt()?;
    config.set_default_model(model);

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn print_record(record: &WeatherRecord) {
    for field in Field::all() {
        let value = match *field {
            Field::RainToday => record.rain_today.as_ref().map(ToString::to_string),
            f if f.is_categorical() => record.text(f).map(str::to_string),
            f => record.number(f).map(|n| n.to_string()),
        };
        if let Some(value) = value {
            println!("  {:<14} {value}", field.as_str());
        }
    }
}

fn print_prediction(result: &PredictionResult) {
    println!("RainTomorrow prediction: {}", result.label);
    println!(
        "  Model:     {} (accuracy {:.2}%)",
        result.model.display_name(),
        result.model_accuracy * 100.0
    );
    println!("  P(No):     {:.1}%", result.probability_no * 100.0);
    println!("  P(Yes):    {:.1}%", result.probability_yes * 100.0);
}

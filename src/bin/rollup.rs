//! Rollup CLI - Command-line interface for Synheart Rollup
//!
//! Commands:
//! - run: Aggregate a trailing window over a simulated health source
//! - generate: Emit synthetic hourly samples for a set of days
//! - validate: Validate a quantity sample file

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use synheart_rollup::synthetic::SyntheticFallbackGenerator;
use synheart_rollup::window::{DayWindow, MAX_WINDOW_DAYS};
use synheart_rollup::{
    CollectingConsumer, DailyStatsPipeline, DayOffset, EngineConfig, MemorySource, MetricKind,
    QuantitySample, RollupError, SampleAdapter, StatsSnapshot, PRODUCER_NAME, ROLLUP_VERSION,
    SCHEMA_VERSION,
};

/// Rollup - Concurrent daily aggregation of wearable health metrics
#[derive(Parser)]
#[command(name = "rollup")]
#[command(author = "Synheart AI Inc")]
#[command(version = ROLLUP_VERSION)]
#[command(about = "Aggregate health metrics into per-day totals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a trailing window over a simulated health source
    Run {
        /// Samples to pre-load into the source (use - for stdin)
        #[arg(short, long)]
        samples: Option<PathBuf>,

        /// Sample input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Engine configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of days to aggregate
        #[arg(long)]
        window_days: Option<u32>,

        /// Metrics to query (comma separated)
        #[arg(long, value_delimiter = ',', value_parser = parse_metric)]
        metrics: Vec<MetricKind>,

        /// Fill days without data with synthetic samples
        #[arg(long)]
        allow_synthetic: bool,

        /// Seed for synthetic samples
        #[arg(long)]
        seed: Option<u64>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Print the run summary to stderr
        #[arg(long)]
        summary: bool,
    },

    /// Emit synthetic hourly samples as NDJSON
    Generate {
        /// Days to generate, as offsets back from today (comma separated)
        #[arg(
            long,
            value_delimiter = ',',
            required = true,
            value_parser = clap::value_parser!(u32).range(0..i64::from(MAX_WINDOW_DAYS))
        )]
        days: Vec<u32>,

        /// Metrics to generate (comma separated)
        #[arg(long, value_delimiter = ',', value_parser = parse_metric)]
        metrics: Vec<MetricKind>,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Validate a quantity sample file
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One line per day
    Ndjson,
    /// Snapshot as a single JSON object
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), RollupCliError> {
    match cli.command {
        Commands::Run {
            samples,
            input_format,
            config,
            window_days,
            metrics,
            allow_synthetic,
            seed,
            output,
            output_format,
            summary,
        } => {
            let mut engine = load_config(config.as_deref())?;
            if let Some(days) = window_days {
                engine.window_days = days;
            }
            if !metrics.is_empty() {
                engine.metrics = metrics;
            }
            if allow_synthetic {
                engine.allow_synthetic_fallback = true;
            }
            if seed.is_some() {
                engine.synthetic_seed = seed;
            }
            engine.validate()?;

            let samples = match samples {
                Some(path) => read_samples(&path, &input_format)?,
                None => Vec::new(),
            };
            cmd_run(engine, samples, &output, &output_format, summary).await
        }

        Commands::Generate {
            days,
            metrics,
            seed,
            output,
        } => cmd_generate(&days, metrics, seed, &output),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, &input_format, json),
    }
}

async fn cmd_run(
    config: EngineConfig,
    samples: Vec<QuantitySample>,
    output: &Path,
    output_format: &OutputFormat,
    summary: bool,
) -> Result<(), RollupCliError> {
    info!(samples = samples.len(), "starting simulated run");
    let source = Arc::new(MemorySource::with_samples(samples));
    let pipeline = DailyStatsPipeline::new(source, config)?;
    let consumer = CollectingConsumer::new();

    let result = pipeline.run(&consumer).await?;
    if !result.unresolved.is_empty() {
        warn!(days = ?result.unresolved, "some days have no data");
    }
    if summary {
        eprintln!("{}", serde_json::to_string_pretty(&result)?);
    }

    let snapshot = consumer.last().ok_or(RollupCliError::NoSnapshot)?;
    write_output(output, &format_snapshot(&snapshot, output_format)?)
}

fn cmd_generate(
    days: &[u32],
    metrics: Vec<MetricKind>,
    seed: Option<u64>,
    output: &Path,
) -> Result<(), RollupCliError> {
    let days: BTreeSet<DayOffset> = days.iter().copied().map(DayOffset).collect();
    let window = DayWindow::for_days(Utc::now(), days.iter().copied())?;
    let metrics = if metrics.is_empty() {
        EngineConfig::default().write_metrics
    } else {
        metrics
    };

    let samples = SyntheticFallbackGenerator::new(metrics, seed).generate(&days, &window);
    info!(days = days.len(), samples = samples.len(), "generated synthetic samples");
    write_output(output, &SampleAdapter::to_ndjson(&samples)?)
}

fn cmd_validate(
    input: &Path,
    input_format: &InputFormat,
    json: bool,
) -> Result<(), RollupCliError> {
    let samples = read_samples(input, input_format)?;
    let results = SampleAdapter::validate_samples(&samples);

    let report = ValidationReport {
        schema_version: SCHEMA_VERSION.to_string(),
        total_samples: samples.len(),
        valid_samples: samples.len() - results.len(),
        invalid_samples: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                metric: r.metric,
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Schema:          {}", report.schema_version);
        println!("Total samples:   {}", report.total_samples);
        println!("Valid samples:   {}", report.valid_samples);
        println!("Invalid samples: {}", report.invalid_samples);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {} (index {}): {}", err.metric, err.index, err.error);
            }
        }
    }

    if report.invalid_samples > 0 {
        Err(RollupCliError::ValidationFailed(report.invalid_samples))
    } else {
        Ok(())
    }
}

// Helper functions

fn parse_metric(value: &str) -> Result<MetricKind, String> {
    value.parse().map_err(|e: RollupError| e.to_string())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, RollupCliError> {
    let config = match path {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn read_samples(
    input: &Path,
    input_format: &InputFormat,
) -> Result<Vec<QuantitySample>, RollupCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            warn!("reading samples from an interactive terminal, end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let samples = match input_format {
        InputFormat::Ndjson => SampleAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => SampleAdapter::parse_array(&input_data)?,
    };
    Ok(samples)
}

fn format_snapshot(
    snapshot: &StatsSnapshot,
    format: &OutputFormat,
) -> Result<String, RollupCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for (day, record) in &snapshot.days {
                let line = serde_json::json!({
                    "producer": PRODUCER_NAME,
                    "day": day,
                    "metrics": record,
                });
                lines.push(line.to_string());
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(snapshot)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(snapshot)?),
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), RollupCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum RollupCliError {
    Io(io::Error),
    Rollup(RollupError),
    Json(serde_json::Error),
    NoSnapshot,
    ValidationFailed(usize),
}

impl From<io::Error> for RollupCliError {
    fn from(e: io::Error) -> Self {
        RollupCliError::Io(e)
    }
}

impl From<RollupError> for RollupCliError {
    fn from(e: RollupError) -> Self {
        RollupCliError::Rollup(e)
    }
}

impl From<serde_json::Error> for RollupCliError {
    fn from(e: serde_json::Error) -> Self {
        RollupCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RollupCliError> for CliError {
    fn from(e: RollupCliError) -> Self {
        match e {
            RollupCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RollupCliError::Rollup(e) => {
                let (code, hint) = match &e {
                    RollupError::AuthorizationDenied(_) => {
                        ("AUTHORIZATION_DENIED", "Grant health data access and retry")
                    }
                    RollupError::WriteFailure { .. } => {
                        ("WRITE_FAILURE", "The source rejected synthetic samples")
                    }
                    RollupError::InvalidConfig(_) | RollupError::InvalidWindow(_) => {
                        ("INVALID_CONFIG", "Check the configuration file and ROLLUP_* variables")
                    }
                    RollupError::ParseError(_) | RollupError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure input matches health.quantity_sample.v1")
                    }
                    _ => ("ROLLUP_ERROR", "Re-run with RUST_LOG=debug for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            RollupCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RollupCliError::NoSnapshot => CliError {
                code: "NO_SNAPSHOT".to_string(),
                message: "The run finished without delivering stats".to_string(),
                hint: None,
            },
            RollupCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} samples failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    schema_version: String,
    total_samples: usize,
    valid_samples: usize,
    invalid_samples: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    metric: MetricKind,
    error: String,
}

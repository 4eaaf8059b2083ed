use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use soilsense_common::PredictionRequest;
use soilsense_inference::{
    load_layered, AnyImageSource, InferenceConfig, LogSink, Pipeline, PipelineError, Result,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one soil prediction from the command line", long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/soilsense.yaml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Image URL, or a local path for offline runs
    #[arg(long)]
    image: String,

    #[arg(short = 'n', long = "nitrogen")]
    n: f64,

    #[arg(short = 'p', long = "phosphorus")]
    p: f64,

    #[arg(short = 'k', long = "potassium")]
    k: f64,

    #[arg(long)]
    ph: f64,

    #[arg(long, default_value = "cli")]
    pot_name: String,

    /// Subject recorded with the result
    #[arg(long, default_value = "local")]
    subject: String,
}

/// The CLI reads the `inference` section of the shared service config.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    inference: InferenceConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config: CliConfig = load_layered(&args.config)?;
    info!("Loaded configuration from {}", args.config);

    let images = Arc::new(AnyImageSource::new(&config.inference.fetch)?);
    let pipeline = Pipeline::from_config(&config.inference, images, Arc::new(LogSink))?;

    let request = PredictionRequest {
        image_url: args.image,
        image_name: None,
        n: args.n,
        p: args.p,
        k: args.k,
        ph: args.ph,
        pot_name: args.pot_name,
    };
    let result = pipeline.predict(&args.subject, &request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout carries only the JSON result.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| PipelineError::ConfigError(e.to_string()))?;

    Ok(())
}

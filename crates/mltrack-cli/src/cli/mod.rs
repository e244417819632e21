mod artifact;
mod config;
mod experiment;
mod metric;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mltrack::client::{TrackerClient, DEFAULT_API_URL};
use serde_json::{Map, Value};

/// Parse `key=value` hyperparameters. Values that parse as JSON keep their
/// type (`lr=0.01` is a number), anything else is stored as a string.
pub fn parse_params(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid parameter format: {}", pair))?;
        if key.is_empty() {
            return Err(anyhow::anyhow!("Invalid parameter format: {}", pair));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Parse `name=value` metric pairs
pub fn parse_metric_pairs(pairs: &[String]) -> Result<Vec<(String, f64)>> {
    pairs
        .iter()
        .map(|pair| {
            let (name, raw) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Invalid metric format: {} (expected name=value)", pair))?;
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid metric value for '{}': {}", name, raw))?;
            Ok((name.to_string(), value))
        })
        .collect()
}

#[derive(Parser)]
#[command(name = "mltrack")]
#[command(about = "Track ML experiments: metrics, artifacts and run status", long_about = None)]
pub struct Cli {
    /// Enable verbose output (info logs)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the mltrack server
    #[arg(long, global = true, env = "MLTRACK_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage experiments
    Experiment(experiment::ExperimentArgs),

    /// Log metric values for an experiment
    Log(metric::LogArgs),

    /// Show logged metric samples
    Metrics(metric::MetricsArgs),

    /// Show per-metric aggregates
    Summary(metric::SummaryArgs),

    /// Manage artifact files
    Artifact(artifact::ArtifactArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

/// Execute the CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let client = TrackerClient::new(&cli.api_url);
    tracing::debug!(api_url = %client.base_url(), "Using server");

    match cli.command {
        Commands::Experiment(args) => experiment::execute(&client, args).await,
        Commands::Log(args) => metric::execute_log(&client, args).await,
        Commands::Metrics(args) => metric::execute_metrics(&client, args).await,
        Commands::Summary(args) => metric::execute_summary(&client, args).await,
        Commands::Artifact(args) => artifact::execute(&client, args).await,
        Commands::Config(args) => config::execute(args).await,
    }
}

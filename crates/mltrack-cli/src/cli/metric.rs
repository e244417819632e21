use super::parse_metric_pairs;
use anyhow::Result;
use clap::Args;
use mltrack::client::TrackerClient;
use mltrack::services::{MetricQuery, NewSample, DEFAULT_METRIC_LIMIT};

#[derive(Args)]
pub struct LogArgs {
    /// Experiment ID
    pub experiment_id: String,

    /// Metric values as name=value
    #[arg(required = true)]
    pub metrics: Vec<String>,

    /// Training step the values belong to
    #[arg(long, default_value_t = 0)]
    pub step: i64,
}

#[derive(Args)]
pub struct MetricsArgs {
    /// Experiment ID
    pub experiment_id: String,

    /// Only show this metric
    #[arg(long)]
    pub name: Option<String>,

    /// Maximum number of samples
    #[arg(long, default_value_t = DEFAULT_METRIC_LIMIT)]
    pub limit: usize,

    /// Number of samples to skip
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(Args)]
pub struct SummaryArgs {
    /// Experiment ID
    pub experiment_id: String,
}

pub async fn execute_log(client: &TrackerClient, args: LogArgs) -> Result<()> {
    let mut samples: Vec<NewSample> = parse_metric_pairs(&args.metrics)?
        .into_iter()
        .map(|(name, value)| NewSample::new(name, args.step, value))
        .collect();

    let response = if samples.len() == 1 {
        let sample = samples.remove(0);
        client.log_metric(&args.experiment_id, &sample).await?
    } else {
        client.log_metrics(&args.experiment_id, samples).await?
    };

    println!("{}", response.message);
    Ok(())
}

pub async fn execute_metrics(client: &TrackerClient, args: MetricsArgs) -> Result<()> {
    let query = MetricQuery {
        metric_name: args.name,
        limit: args.limit,
        offset: args.offset,
    };

    let samples = client.get_metrics(&args.experiment_id, &query).await?;
    if samples.is_empty() {
        println!("No metrics found.");
        return Ok(());
    }

    println!("{:>8}  {:<24}  {:>14}  timestamp", "step", "metric", "value");
    for sample in samples {
        println!(
            "{:>8}  {:<24}  {:>14.6}  {}",
            sample.step,
            sample.metric_name,
            sample.value,
            sample.timestamp.to_rfc3339()
        );
    }
    Ok(())
}

pub async fn execute_summary(client: &TrackerClient, args: SummaryArgs) -> Result<()> {
    let summaries = client.summarize_metrics(&args.experiment_id).await?;
    if summaries.is_empty() {
        println!("No metrics found.");
        return Ok(());
    }

    println!(
        "{:<24}  {:>12}  {:>12}  {:>12}  {:>12}  {:>8}",
        "metric", "min", "max", "mean", "latest", "count"
    );
    for summary in summaries {
        println!(
            "{:<24}  {:>12.6}  {:>12.6}  {:>12.6}  {:>12.6}  {:>8}",
            summary.metric_name, summary.min, summary.max, summary.mean, summary.latest, summary.count
        );
    }
    Ok(())
}

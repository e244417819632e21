use super::parse_params;
use anyhow::Result;
use clap::{Args, Subcommand};
use mltrack::client::{Session, TrackerClient};
use mltrack::services::{Experiment, ExperimentFilters, ExperimentStatus, DEFAULT_EXPERIMENT_PAGE_SIZE};

#[derive(Args)]
pub struct ExperimentArgs {
    #[command(subcommand)]
    command: ExperimentCommands,
}

#[derive(Subcommand)]
enum ExperimentCommands {
    /// Create a new running experiment
    Start {
        /// Experiment name
        name: String,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Hyperparameter key=value pairs (values parsed as JSON when possible)
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// List experiments, newest first
    List {
        /// Page number (starting at 1)
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Page size
        #[arg(long, default_value_t = DEFAULT_EXPERIMENT_PAGE_SIZE)]
        size: usize,

        /// Only show experiments with this status
        #[arg(long)]
        status: Option<String>,
    },

    /// Show an experiment
    Get {
        /// Experiment ID
        id: String,
    },

    /// Set the final status of an experiment
    Finish {
        /// Experiment ID
        id: String,

        /// Status to record (running, completed, failed)
        #[arg(long, default_value = "completed")]
        status: String,
    },

    /// Add tags to an experiment, keeping existing ones
    Tag {
        /// Experiment ID
        id: String,

        /// Tags to add
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Delete an experiment with its metrics and artifacts
    Delete {
        /// Experiment ID
        id: String,
    },

    /// Show several experiments side by side
    Compare {
        /// Experiment IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

pub async fn execute(client: &TrackerClient, args: ExperimentArgs) -> Result<()> {
    match args.command {
        ExperimentCommands::Start { name, tags, params } => {
            let hyperparameters = parse_params(&params)?;
            let experiment = client.create_experiment(&name, tags, hyperparameters).await?;
            println!("Started experiment: {}", experiment.id);
            println!("{}", serde_json::to_string_pretty(&experiment)?);
        },

        ExperimentCommands::List { page, size, status } => {
            let status = status.map(|s| s.parse::<ExperimentStatus>()).transpose()?;
            let filters = ExperimentFilters { page, size, status };

            let experiments = client.list_experiments(&filters).await?;
            if experiments.is_empty() {
                println!("No experiments found.");
            } else {
                for experiment in &experiments {
                    print_row(experiment);
                }
            }
        },

        ExperimentCommands::Get { id } => {
            let experiment = client.get_experiment(&id).await?;
            println!("{}", serde_json::to_string_pretty(&experiment)?);
        },

        ExperimentCommands::Finish { id, status } => {
            let status: ExperimentStatus = status.parse()?;
            let experiment = client.update_status(&id, status).await?;
            println!("Experiment {} marked {}", experiment.id, experiment.status);
        },

        ExperimentCommands::Tag { id, tags } => {
            let mut session = Session::resume(client.clone(), &id).await?;
            let experiment = session.add_tags(tags).await?;
            println!("Tags for {}: {}", experiment.id, experiment.tags.join(", "));
        },

        ExperimentCommands::Delete { id } => {
            client.delete_experiment(&id).await?;
            println!("Deleted experiment: {}", id);
        },

        ExperimentCommands::Compare { ids } => {
            let experiments = client.compare_experiments(&ids).await?;
            println!("{}", serde_json::to_string_pretty(&experiments)?);
        },
    }

    Ok(())
}

fn print_row(experiment: &Experiment) {
    let tags = if experiment.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", experiment.tags.join(", "))
    };
    println!(
        "{}  {:<9}  {}  {}{}",
        experiment.id,
        experiment.status.to_string(),
        experiment.created_at.format("%Y-%m-%d %H:%M:%S"),
        experiment.name,
        tags
    );
}

use anyhow::Result;
use clap::{Args, Subcommand};
use mltrack::client::TrackerClient;
use mltrack::services::DEFAULT_ARTIFACT_LIMIT;
use std::path::PathBuf;

#[derive(Args)]
pub struct ArtifactArgs {
    #[command(subcommand)]
    command: ArtifactCommands,
}

#[derive(Subcommand)]
enum ArtifactCommands {
    /// Upload a file to an experiment
    Upload {
        /// Experiment ID
        experiment_id: String,

        /// Local file to upload
        path: PathBuf,
    },

    /// List artifacts of an experiment
    List {
        /// Experiment ID
        experiment_id: String,

        /// Number of artifacts to skip
        #[arg(long, default_value_t = 0)]
        skip: usize,

        /// Maximum number of artifacts
        #[arg(long, default_value_t = DEFAULT_ARTIFACT_LIMIT)]
        limit: usize,
    },

    /// Download an artifact's content
    Download {
        /// Artifact ID
        id: String,

        /// Destination path (defaults to the stored filename)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Remove an artifact and its file
    Remove {
        /// Artifact ID
        id: String,
    },
}

pub async fn execute(client: &TrackerClient, args: ArtifactArgs) -> Result<()> {
    match args.command {
        ArtifactCommands::Upload {
            experiment_id,
            path,
        } => {
            if !path.is_file() {
                return Err(anyhow::anyhow!("Not a file: {}", path.display()));
            }
            let artifact = client.upload_artifact(&experiment_id, &path).await?;
            println!("Uploaded artifact: {}", artifact.id);
            println!("{}", serde_json::to_string_pretty(&artifact)?);
        },

        ArtifactCommands::List {
            experiment_id,
            skip,
            limit,
        } => {
            let artifacts = client.list_artifacts(&experiment_id, skip, limit).await?;
            if artifacts.is_empty() {
                println!("No artifacts found.");
            } else {
                for artifact in artifacts {
                    println!(
                        "{}  {:>12}  {}  {}",
                        artifact.id,
                        artifact.size_bytes,
                        artifact.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
                        artifact.filename
                    );
                }
            }
        },

        ArtifactCommands::Download { id, output } => {
            let dest = match output {
                Some(path) => path,
                None => PathBuf::from(client.get_artifact(&id).await?.filename),
            };
            let written = client.download_artifact(&id, &dest).await?;
            println!("Downloaded {} bytes to {}", written, dest.display());
        },

        ArtifactCommands::Remove { id } => {
            client.delete_artifact(&id).await?;
            println!("Removed artifact: {}", id);
        },
    }

    Ok(())
}

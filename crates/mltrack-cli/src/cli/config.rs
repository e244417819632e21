use anyhow::Result;
use clap::{Args, Subcommand};
use mltrack::services::ConfigService;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing config file
        #[arg(long, short)]
        force: bool,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}

pub async fn execute(args: ConfigArgs) -> Result<()> {
    let config_service = ConfigService::from_env();

    match args.command {
        ConfigCommands::Init { force } => {
            if config_service.exists() && !force {
                return Err(anyhow::anyhow!(
                    "Config already exists at {}. Use --force to overwrite.",
                    config_service.path().display()
                ));
            }
            config_service.init()?;
            println!("Wrote {}", config_service.path().display());
        },

        ConfigCommands::Get { key } => {
            let value = config_service.get(&key)?;
            println!("{}", value);
        },

        ConfigCommands::Set { key, value } => {
            config_service.set(&key, value.clone())?;
            println!("Set {} = {}", key, value);
        },
    }

    Ok(())
}

use anyhow::Result;
use clap::Parser;

mod cli;

use cli::commands::{config as config_command, inspect::InspectCommand, prepare::PrepareCommand};
use cli::{Cli, Commands};
use contrib_workflow::{config, init_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config()?;

    if let Err(e) = init_telemetry(&config.observability) {
        eprintln!("⚠️  {e}");
    }

    match cli.command {
        Commands::Inspect { path, hosting_service } => {
            InspectCommand::new(path)
                .with_hosting_service(hosting_service)
                .execute(config)
                .await
        }
        Commands::Prepare {
            path,
            hosting_service,
            title,
            comment,
            into,
        } => {
            PrepareCommand::new(path)
                .with_hosting_service(hosting_service)
                .with_message(title, comment)
                .with_target_branch(into)
                .execute(config)
                .await
        }
        Commands::Config => config_command::execute(config),
    }
}

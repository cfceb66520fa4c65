use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "contrib")]
#[command(about = "Prepare pull request contributions from a local working tree")]
#[command(long_about = "contrib tracks a contribution workflow per project: it detects the work branch \
                       and origin repository, then walks the creation or update chain for the pull request. \
                       Start with 'contrib inspect' to see what the workflow knows about your project.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the workflow for a project and print its context as JSON
    Inspect {
        /// Project working tree
        #[arg(long, default_value = ".", help = "Path to the project's working tree")]
        path: PathBuf,
        /// Hosting service whose strategy drives the workflow
        #[arg(long, help = "Hosting service key (defaults to workflow.default_hosting_service)")]
        hosting_service: Option<String>,
    },
    /// Run the creation or update chain, whichever the project is ready for
    Prepare {
        /// Project working tree
        #[arg(long, default_value = ".", help = "Path to the project's working tree")]
        path: PathBuf,
        /// Hosting service whose strategy drives the workflow
        #[arg(long, help = "Hosting service key (defaults to workflow.default_hosting_service)")]
        hosting_service: Option<String>,
        /// Pull request title
        #[arg(long, help = "Title to use instead of one derived from the work branch")]
        title: Option<String>,
        /// Pull request comment
        #[arg(long, help = "Comment to attach to the contribution")]
        comment: Option<String>,
        /// Branch to contribute to
        #[arg(long, help = "Branch the contribution targets (defaults to workflow.default_contribute_to_branch)")]
        into: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

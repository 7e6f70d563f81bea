//! Command-line interface definitions.
//!
//! Defines the CLI structure for uc-deploy using `clap`: global environment
//! and output flags, the `deployment` command group, and the configuration
//! commands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::infrastructure::config::settings::DEFAULT_CONFIG_FILE;

/// Deploy and manage user-code deployments on a shared scheduling cluster
#[derive(Parser, Debug)]
#[command(name = "uc-deploy")]
#[command(version)]
pub struct Cli {
    /// The environment
    #[arg(short, long, global = true, default_value = "dev")]
    pub environment: String,

    /// Path to the config file
    #[arg(short, long = "config-file", global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output debug logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage user-code deployments
    #[command(subcommand)]
    Deployment(DeploymentCommand),

    /// Generate a configuration file interactively
    InitConfig(InitConfigArgs),

    /// Output the configuration that is currently in use
    ShowConfig,
}

/// Subcommands for `uc-deploy deployment`.
#[derive(Subcommand, Debug)]
pub enum DeploymentCommand {
    /// List user-code deployments currently active in the environment
    List,
    /// Build and deploy the current branch as a user-code deployment
    Deploy(DeployArgs),
    /// Redeploy an image tag that was already built and pushed
    Revive(ReviveArgs),
    /// Delete one or every user-code deployment
    Delete(DeleteArgs),
    /// Tail the logs of a deployment
    Check(CheckArgs),
}

/// Arguments for `deployment deploy`.
#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Redeploy everything, ignoring the current state of the deployment
    #[arg(short, long)]
    pub force: bool,

    /// Skip building and pushing the image; reuse the one already pushed
    #[arg(short = 'b', long)]
    pub skip_build: bool,

    /// Suffix appended to the branch-derived deployment name
    #[arg(short = 's', long)]
    pub deployment_name_suffix: Option<String>,

    /// Explicit deployment name; overrides the branch and the suffix
    #[arg(short = 'n', long)]
    pub deployment_name: Option<String>,

    /// Clear the deployment lock before acquiring it
    #[arg(short, long)]
    pub reset_lock: bool,

    /// Run the image builder through sudo
    #[arg(short, long)]
    pub use_sudo: bool,
}

/// Arguments for `deployment revive`.
#[derive(Args, Debug)]
pub struct ReviveArgs {
    /// Deployment name
    #[arg(short, long)]
    pub name: String,

    /// Image tag to deploy
    #[arg(short, long)]
    pub tag: String,
}

/// Arguments for `deployment delete`.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Delete every user-code deployment in the environment
    #[arg(short, long, conflicts_with = "name")]
    pub all: bool,

    /// Deployment to delete; defaults to the current branch
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Arguments for `deployment check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Deployment to check; defaults to the current branch
    #[arg(short, long)]
    pub name: Option<String>,

    /// Seconds to follow the logs for
    #[arg(short, long, default_value_t = 60)]
    pub timeout: u64,
}

/// Arguments for `init-config`.
#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Output path for the generated configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub file: PathBuf,

    /// Overwrite the file if it already exists
    #[arg(long)]
    pub force: bool,
}

//! CLI module graph and command dispatch.

pub mod command;
pub mod config;
pub mod deployment;
pub mod init;
pub mod output;

use tracing::debug;

use self::command::{Cli, ColorChoice, Commands};
use self::output::Output;
use crate::application::deployment::DeploymentService;
use crate::error::Result;
use crate::infrastructure::bootstrap::build_context;
use crate::infrastructure::config::logging::LoggingConfig;
use crate::infrastructure::config::settings::UserCodeConfig;

/// Apply the color flag and build the output for the other global flags.
pub fn configure_output(cli: &Cli) -> Output {
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }
    Output::new(cli.json, cli.quiet)
}

fn init_logging(logging: &LoggingConfig, verbose: u8) {
    if verbose > 0 {
        logging.verbose().init();
    } else {
        logging.init();
    }
}

/// Run the parsed command line.
pub async fn execute(cli: Cli, out: Output) -> Result<()> {
    if let Commands::InitConfig(args) = &cli.command {
        init_logging(&LoggingConfig::default(), cli.verbose);
        return init::execute(out, &args.file, args.force, &cli.environment);
    }

    let config = UserCodeConfig::load(&cli.config_file, &cli.environment)?;
    init_logging(&config.logging, cli.verbose);
    debug!(
        environment = %config.environment,
        path = %cli.config_file.display(),
        "Loaded configuration"
    );

    match cli.command {
        Commands::ShowConfig => config::execute_show(out, &config),
        Commands::Deployment(command) => {
            let ctx = build_context(&config).await?;
            let service = DeploymentService::new(&ctx);
            service.verify_scheduler_version().await?;
            service.ensure_registry().await?;
            out.header(&config.environment);
            deployment::execute(out, &service, command).await
        }
        Commands::InitConfig(_) => Ok(()),
    }
}

use clap::Parser;

use uc_deploy::adapter::inbound::cli::command::Cli;
use uc_deploy::adapter::inbound::cli::{configure_output, execute};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let out = configure_output(&cli);
    if let Err(e) = execute(cli, out).await {
        out.error(&e.to_string());
        std::process::exit(1);
    }
}

//! dr1ver-cli entry point

use anyhow::Result;
use clap::Parser;
use dr1ver_cli::commands::{check, cleanup, run, Command};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(
    name = "dr1ver-cli",
    version,
    about = "Storage-driver migration e2e orchestrator"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run(args) => run::handle(args).await?,
        Command::Check(args) => check::handle(args)?,
        Command::Cleanup(args) => cleanup::handle(args).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

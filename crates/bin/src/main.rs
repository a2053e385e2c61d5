mod cli;
mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::output::OutputFormat;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays parseable with --json
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("netconverge=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    match &cli.command {
        Commands::Schema(args) => commands::schema::run(args, format),
        Commands::Flatten(args) => commands::flatten::run(args, format),
        Commands::Diff(args) => commands::diff::run(args, format),
        Commands::Validate(args) => commands::validate::run(args, format),
        Commands::Plan(args) => commands::plan::run(args, format).await,
    }
}

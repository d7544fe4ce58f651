use clap::Parser;
use eyre::{Context, Result};
use log::info;

mod cli;
mod commands;
mod config;
mod observability;
mod record;
mod sink;

use cli::{Cli, Commands};
use commands::emit::EmitArgs;
use commands::serve::ServeArgs;
use config::Config;

fn run(cli: Cli, config: Config) -> Result<()> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Emit {
            tag,
            fields,
            json,
            context,
            timestamp,
            base_url,
        } => commands::emit::run(
            EmitArgs {
                tag,
                fields,
                json,
                context,
                timestamp,
                base_url,
            },
            &config,
            quiet,
        ),
        Commands::Demo { base_url, tag } => commands::demo::run(base_url, &tag, &config, quiet),
        Commands::Serve {
            port,
            bind,
            file,
            max_body,
        } => commands::serve::run(
            ServeArgs {
                port,
                bind,
                file,
                max_body,
            },
            &config,
            quiet,
        ),
        Commands::Config { action } => commands::config::run(action, &config),
        Commands::Completions { shell } => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first
    let cli = Cli::parse();

    // Load configuration (before logging, so log messages in Config::load are silent)
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    observability::diagnostics::init(&config, cli.verbose, cli.quiet).context("Failed to setup logging")?;

    info!("Starting logship with config from: {:?}", cli.config);

    run(cli, config).context("Command failed")?;

    Ok(())
}

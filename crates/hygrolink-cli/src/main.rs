use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;

use cli::{Cli, Commands};
use commands::{WatchArgs, cmd_config, cmd_decode, cmd_scan, cmd_watch};
use config::Config;
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "hygrolink", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let config = Config::load_from(&config_path);

    match cli.command {
        Commands::Scan {
            timeout,
            named_only,
            output,
        } => {
            let opts =
                FormatOptions::new(output.resolve_fahrenheit(config.fahrenheit), cli.no_color);
            cmd_scan(timeout, named_only, output.format, cli.quiet, &opts, &config).await?;
        }
        Commands::Watch {
            device,
            count,
            output,
        } => {
            let opts =
                FormatOptions::new(output.resolve_fahrenheit(config.fahrenheit), cli.no_color);
            cmd_watch(WatchArgs {
                device: device.device,
                scan_timeout: device.scan_timeout,
                count,
                format: output.format,
                quiet: cli.quiet,
                opts: &opts,
                config: &config,
            })
            .await?;
        }
        Commands::Decode { payload, output } => {
            let opts =
                FormatOptions::new(output.resolve_fahrenheit(config.fahrenheit), cli.no_color);
            cmd_decode(&payload, output.format, &opts)?;
        }
        Commands::Config { action } => {
            cmd_config(action, &config_path)?;
        }
        Commands::Completions { .. } => {
            // Already handled above
        }
    }

    Ok(())
}

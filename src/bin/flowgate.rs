//! Flowgate CLI Binary
//!
//! Command-line interface for the Flowgate workflow control plane.

use anyhow::Context;
use clap::Parser;
use flowgate::cli::{Cli, RunContext};
use flowgate::config::ConfigLoader;
use flowgate::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{debug, error};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    debug!("Flowgate CLI starting");

    match run(&cli).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<String> {
    let context = RunContext::new(cli.config.clone(), cli.state.clone(), cli.namespace.clone())
        .map_err(|e| anyhow::anyhow!(flowgate::cli::map_error(&e)))
        .context("Error initializing flowgate")?;
    context
        .execute(&cli.command, &cli.output)
        .await
        .map_err(|e| anyhow::anyhow!(flowgate::cli::map_error(&e)))
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loader = match cli.config {
        Some(ref config_path) => ConfigLoader::new().with_file(config_path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().map(|c| c.logging).unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }
    config
}

//! `dronecot` - Remote ID to TAK gateway daemon.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use dronecot::cli::Cli;
use dronecot::config::DEFAULT_CONFIG_FILE;
use dronecot::service::{exit_code_for, render_unit, EXIT_FAILURE};
use dronecot::{init_logging, pipeline, Config};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.service_unit {
        return match print_service_unit(&cli) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("dronecot: {err:#}");
                ExitCode::from(EXIT_FAILURE)
            }
        };
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    // Configuration errors are logged at the command-line verbosity
    let config = match Config::load(cli.config_file.clone(), cli.pref_package.clone()) {
        Ok(config) => config,
        Err(err) => {
            init_logging(cli.verbosity());
            return Err(err).context("cannot start dronecot");
        }
    };
    init_logging(cli.verbosity().with_debug(config.debug));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime
        .block_on(pipeline::run(&config))
        .context("dronecot stopped")
}

fn print_service_unit(cli: &Cli) -> anyhow::Result<()> {
    let exec = std::env::current_exe().context("cannot locate the dronecot executable")?;
    let config = cli
        .config_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    print!("{}", render_unit(&exec, &config));
    Ok(())
}

fn exit_status(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<dronecot::Error>()
        .map_or(EXIT_FAILURE, exit_code_for)
}

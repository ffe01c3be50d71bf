//! Wardmon CLI
//!
//! Reads the configuration file, selects the monitor or tester role,
//! and runs it until the process is stopped.

mod args;

use anyhow::{Context, Result};
use args::{Args, Role};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use wardmon_core::Config;
use wardmon_roles::{tester, Monitor};

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wardmon={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load_from_file(&args.config)
        .with_context(|| format!("cannot load configuration from {:?}", args.config))?;
    debug!("loaded configuration from {:?}", args.config);

    let role = match args.role {
        Some(role) => role,
        None => {
            let value = config
                .general("role")
                .context("role is not defined in the configuration")?;
            Role::from_config_value(value)
                .with_context(|| format!("unknown role {:?}", value))?
        }
    };

    // Both roles run until the process is stopped.
    match role {
        Role::Monitor => {
            info!("starting monitor role");
            Monitor::bind(&config).await?.run().await
        }
        Role::Tester => {
            info!("starting tester role");
            tester::run(config).await
        }
    }
    .map_err(Into::into)
}

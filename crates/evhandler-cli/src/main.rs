//! CLI entry point for evhandler.
//!
//! This binary provides the `evhandler` command with subcommands for a short
//! demo, a concurrent stress harness, and configuration inspection.

mod cli;
mod demo;
mod helpers;
mod stress;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use evhandler::Registry;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, load_config};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Demo => {
            for line in demo::run(config)? {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Stress {
            dispatchers,
            churners,
            lists,
            duration_ms,
            json,
        } => {
            let opts = stress::StressOptions {
                dispatchers,
                churners,
                lists,
                duration: Duration::from_millis(duration_ms),
            };
            let registry = Registry::with_config(config)?;
            let report = stress::run(registry, &opts)?;

            if json {
                let text =
                    serde_json::to_string_pretty(&report).context("failed to encode report")?;
                println!("{text}");
            } else {
                print!("{}", stress::render(&report));
            }

            if report.late_invocations > 0 {
                bail!(
                    "{} handler invocation(s) observed after deregistration",
                    report.late_invocations
                );
            }
            info!("drain guarantee held");
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml_string());
            Ok(())
        }
    }
}

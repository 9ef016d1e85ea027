//! CLI argument definitions for evhandler.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// evhandler -- event-handler registry toolkit.
#[derive(Parser)]
#[command(
    name = "evhandler",
    version,
    about = "evhandler -- event-handler registry toolkit",
    long_about = "Exercise the event-handler registry: run a small demo, hammer it with \
                  concurrent dispatch and register/deregister churn, or inspect the \
                  effective configuration."
)]
pub struct Cli {
    /// Registry limits file (TOML).  `EVHANDLER_*` variables override it.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a few handlers, dispatch them, and print the call order.
    Demo,

    /// Dispatch and churn handlers concurrently, checking the drain guarantee.
    Stress {
        /// Threads running dispatch passes.
        #[arg(long, default_value_t = 4)]
        dispatchers: usize,

        /// Threads registering and deregistering handlers.
        #[arg(long, default_value_t = 2)]
        churners: usize,

        /// Number of distinct handler lists.
        #[arg(long, default_value_t = 4)]
        lists: usize,

        /// How long to run, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective registry configuration as TOML.
    Config,
}

//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use camview_core::logging::LogLevel;
use camview_core::models::SessionMode;

/// Live viewer for one or two RTSP cameras
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (created with defaults when missing)
    #[arg(long, default_value = camview_core::config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level when RUST_LOG is unset (trace/debug/info/warn/error)
    #[arg(long, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a session and control it from stdin
    Run {
        /// single, tabbed or sync
        #[arg(long, value_parser = parse_mode)]
        mode: Option<SessionMode>,

        /// Address of camera 1 (saved to the config)
        #[arg(long)]
        primary: Option<String>,

        /// Address of camera 2 (saved to the config)
        #[arg(long)]
        secondary: Option<String>,

        /// Tabbed mode: also pull the other camera as a side feed
        #[arg(long)]
        dual_view: bool,

        /// Stop after this many seconds instead of reading commands
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Probe configured cameras and print the results
    Test {
        #[arg(long)]
        primary: Option<String>,

        #[arg(long)]
        secondary: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the config file path and contents
    Config,
}

fn parse_mode(s: &str) -> Result<SessionMode, String> {
    SessionMode::parse(s).ok_or_else(|| format!("unknown mode '{}' (single, tabbed, sync)", s))
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    s.parse()
}

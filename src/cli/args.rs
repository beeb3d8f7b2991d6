//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Local change detection for sync daemons
#[derive(Parser)]
#[command(
    name = "treesync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch a sync root and relay coalesced changes",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Write a default settings file
    #[command(about = "Create a settings file with default values")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display effective settings after all layers are applied")]
    Config,

    /// Watch the sync root and relay changes
    #[command(
        about = "Watch the sync root and relay coalesced changes",
        after_help = "Examples:\n  treesync watch\n  treesync watch --root ~/Drive --json\n  treesync watch --status-interval 5"
    )]
    Watch {
        /// Sync root (overrides config)
        #[arg(long, value_name = "PATH")]
        root: Option<PathBuf>,

        /// Seconds between streamed status snapshots (0 disables)
        #[arg(long, default_value = "2")]
        status_interval: u64,

        /// Print changes and snapshots as JSON lines
        #[arg(long)]
        json: bool,
    },
}

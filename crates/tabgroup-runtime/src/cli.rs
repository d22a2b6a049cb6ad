//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tabgroup", about = "Group browser tabs by ticket id")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/tabgroup/config.toml)
    #[arg(long, short = 'c', global = true, env = "TABGROUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ticket map store (default: $XDG_DATA_HOME/tabgroup/store.json)
    #[arg(long, short = 's', global = true, env = "TABGROUP_STORE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a newline-delimited JSON event stream to a simulated browser
    Run(RunOpts),
    /// Print the persisted ticket map
    Map,
    /// Delete the persisted ticket map
    Clear,
}

#[derive(clap::Args, Default)]
pub struct RunOpts {
    /// Read events from this file instead of stdin
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Allowed domain; repeat or comma-separate. Replaces the configured list.
    #[arg(long = "domain", value_delimiter = ',')]
    pub domains: Vec<String>,

    /// Artificial delay per browser call, in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// `$XDG_CONFIG_HOME/tabgroup/config.toml`, falling back to `~/.config`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(dir).join("tabgroup/config.toml"));
    }
    home_dir().map(|h| h.join(".config/tabgroup/config.toml"))
}

/// `$XDG_DATA_HOME/tabgroup/store.json`, falling back to `~/.local/share`,
/// then the working directory.
pub fn default_store_path() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(dir).join("tabgroup/store.json");
    }
    match home_dir() {
        Some(h) => h.join(".local/share/tabgroup/store.json"),
        None => PathBuf::from("tabgroup-store.json"),
    }
}

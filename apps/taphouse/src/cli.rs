//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taphouse_types::{ColorChoice, ServiceAction};

/// taphouse - Homebrew operations with a live log
#[derive(Parser)]
#[command(name = "taphouse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Homebrew operations with a live log and refreshed package state")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Write debug logs to the taphouse log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the brew executable
    #[arg(long, global = true, value_name = "PATH")]
    pub brew: Option<String>,

    /// Cancel the operation after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Install formulae or casks
    #[command(alias = "i")]
    Install {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Uninstall formulae or casks
    #[command(alias = "rm")]
    Uninstall {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Upgrade outdated packages
    #[command(alias = "ug")]
    Upgrade {
        /// Specific packages to upgrade (empty = all packages)
        packages: Vec<String>,
    },

    /// Fetch the newest package index
    #[command(alias = "up")]
    Update,

    /// Remove stale downloads and old versions
    Cleanup,

    /// Install everything listed in a Brewfile
    Import {
        /// Path to the Brewfile
        brewfile: PathBuf,
    },

    /// Start, stop or restart a background service
    Service {
        #[arg(value_enum)]
        action: ServiceAction,
        /// Service name
        name: String,
    },

    /// Remove the quarantine attribute from an application
    Unquarantine {
        /// Application bundle or file
        path: PathBuf,
    },

    /// Run any command as an operation
    Exec {
        /// Label shown for the operation
        #[arg(long)]
        label: Option<String>,

        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List installed packages
    #[command(alias = "ls")]
    List,

    /// List packages with newer versions available
    Outdated,

    /// List background services and their status
    Services,
}

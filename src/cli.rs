//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dovarr",
    version,
    about = "Library-wide Dolby Vision Profile 7 to 8.1 conversion daemon"
)]
pub struct Cli {
    /// Enable verbose logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: scheduled scans plus the conversion loop.
    Start,

    /// Run a one-shot library scan.
    Scan {
        /// Re-inspect every file instead of skipping known paths.
        #[arg(long)]
        full: bool,

        /// Stop after this many files (useful for a first test scan).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Classify a single file and print the verdict.
    Probe {
        /// File to classify.
        file: PathBuf,

        /// Print the verdict as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Convert a single file to Profile 8.1.
    Convert {
        /// File to convert.
        file: PathBuf,

        /// Extract to disk instead of using the piped fast path.
        #[arg(long)]
        safe: bool,

        /// Convert even a complex FEL (always keeps the backup).
        #[arg(long)]
        force: bool,

        /// Strip the RPU entirely, producing plain HDR10.
        #[arg(long)]
        hdr10: bool,

        /// Remove the backup after a successful swap.
        #[arg(long)]
        delete_backup: bool,

        /// Write the output here instead of replacing the original.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Override the scratch directory for this conversion.
        #[arg(long)]
        temp_dir: Option<PathBuf>,
    },

    /// Show the in-flight conversion, queue counts, and recent failures.
    Status,

    /// Read or change persistent settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Catalog maintenance.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Verify that the required external tools are installed.
    CheckTools,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// List all settings.
    List,
    /// Print one setting.
    Get { key: String },
    /// Change one setting.
    Set { key: String, value: String },
}

#[derive(Subcommand)]
pub enum DbAction {
    /// Export the catalog as JSON to the config directory.
    Export,
    /// Clear all records and re-engage the first-run interlock.
    Clear,
    /// Clear failed rows (one path, or all of them).
    ClearFailed { path: Option<PathBuf> },
}

pub mod render;
pub mod rules;
pub mod scan;

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ReportFormat;
use crate::issue::Severity;

#[derive(Parser)]
#[command(name = "droidscan")]
#[command(version, about = "Static security analysis for Android projects", long_about = None)]
pub struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print the report itself
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a project directory or a single file
    Scan(ScanArgs),
    /// List the available rules and whether the configuration enables them
    Rules {
        /// Configuration file (defaults to the nearest .droidscan.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Project directory or file to scan
    pub source: PathBuf,

    /// AndroidManifest.xml to use instead of searching the project
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Configuration file (defaults to the nearest .droidscan.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Rule ids to skip, comma separated
    #[arg(long, value_delimiter = ',')]
    pub disable: Vec<String>,

    /// Only run rules from these categories, comma separated
    #[arg(long = "category", value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Exit with status 1 when an issue of this severity or worse is found
    #[arg(long)]
    pub fail_on: Option<Severity>,

    /// Per-rule time budget for a single file, in milliseconds
    #[arg(long)]
    pub rule_budget_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Quiet,
    Normal,
    Verbose,
}

pub fn get_output_mode(quiet: bool, verbose: u8) -> OutputMode {
    if quiet {
        OutputMode::Quiet
    } else if verbose > 0 {
        OutputMode::Verbose
    } else {
        OutputMode::Normal
    }
}

//! # droidscan
//!
//! Command-line front end: scans an Android project and prints the findings
//! as text, JSON or SARIF.

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use droidscan::commands::{self, Cli, Commands};

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("droidscan={}", default_level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output_mode = commands::get_output_mode(cli.quiet, cli.verbose);

    let result = match cli.command {
        Commands::Scan(args) => commands::scan::handle_scan(args, output_mode),
        Commands::Rules { config } => {
            let project_root = std::env::current_dir().unwrap_or_default();
            commands::rules::handle_rules_command(&project_root, config.as_deref()).map(|_| ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

use colored::*;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

use super::render::{SeverityCounts, render_json, render_sarif, render_text};
use super::{OutputMode, ScanArgs};
use crate::config::{DroidscanConfig, ReportFormat};
use crate::error::ScanError;
use crate::issue::{Issue, Severity};
use crate::rules::RuleSelection;
use crate::scanner::{ScanOptions, ScanRequest, Scanner};

pub const EXIT_FAIL_ON: u8 = 1;
pub const EXIT_SOURCE_MISSING: u8 = 2;

/// Ordering used by `--fail-on`, most severe last.
fn risk(severity: Severity) -> u8 {
    match severity {
        Severity::Info => 0,
        Severity::Warning => 1,
        Severity::Error => 2,
        Severity::Vulnerability => 3,
    }
}

pub fn reaches_threshold(issues: &[Issue], threshold: Severity) -> bool {
    issues.iter().any(|i| risk(i.severity()) >= risk(threshold))
}

/// Command-line flags take precedence over the configuration file.
pub fn apply_overrides(config: &mut DroidscanConfig, args: &ScanArgs) {
    if let Some(format) = args.format {
        config.report.format = format;
    }
    if args.output.is_some() {
        config.report.output = args.output.clone();
    }
    if args.manifest.is_some() {
        config.scan.manifest = args.manifest.clone();
    }
    for id in &args.disable {
        if !config.scan.disabled_rules.contains(id) {
            config.scan.disabled_rules.push(id.clone());
        }
    }
    if !args.categories.is_empty() {
        config.scan.categories = args.categories.clone();
    }
    if args.rule_budget_ms.is_some() {
        config.scan.rule_budget_ms = args.rule_budget_ms;
    }
}

pub fn build_request(source: &Path, config: &DroidscanConfig) -> ScanRequest {
    ScanRequest {
        source: source.to_path_buf(),
        manifest: config.scan.manifest.clone(),
        selection: RuleSelection {
            disabled: config.scan.disabled_rules.clone(),
            categories: config.scan.categories.clone(),
        },
        options: ScanOptions {
            rule_budget: config.scan.rule_budget(),
            ignore_patterns: config.scan.ignore_patterns.clone(),
            respect_ignore_files: config.scan.respect_ignore_files,
        },
    }
}

fn spinner(message: &str) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn handle_scan(args: ScanArgs, output_mode: OutputMode) -> anyhow::Result<ExitCode> {
    if !args.source.exists() {
        eprintln!("{} Source path does not exist: {}", "error:".red().bold(), args.source.display());
        return Ok(ExitCode::from(EXIT_SOURCE_MISSING));
    }

    let mut config = DroidscanConfig::resolve(args.config.as_deref(), &args.source)?;
    apply_overrides(&mut config, &args);
    debug!(?config, "Effective configuration");

    let format = config.report.format;
    let request = build_request(&args.source, &config);
    let scanner = Scanner::with_builtin_rules()?;

    let pb = if format == ReportFormat::Text && output_mode != OutputMode::Quiet {
        spinner("Scanning...")
    } else {
        indicatif::ProgressBar::hidden()
    };
    let outcome = scanner.run_with_progress(&request, |progress| {
        pb.set_message(format!(
            "[{}/{}] {}",
            progress.index + 1,
            progress.total,
            progress.path.display()
        ));
    });
    pb.finish_and_clear();

    let report = match outcome {
        Ok(report) => report,
        Err(ScanError::SourceNotFound(path)) => {
            eprintln!("{} Source path does not exist: {}", "error:".red().bold(), path.display());
            return Ok(ExitCode::from(EXIT_SOURCE_MISSING));
        }
        Err(e) => return Err(e.into()),
    };

    let issues = report.unique_issues();
    info!(
        total = report.issues.len(),
        unique = issues.len(),
        "Issues collected"
    );

    if output_mode == OutputMode::Verbose {
        for anomaly in &report.anomalies {
            eprintln!("{} {}", "anomaly:".dimmed(), anomaly.summary());
        }
    }

    let root = if args.source.is_dir() {
        args.source.as_path()
    } else {
        args.source.parent().unwrap_or(Path::new(""))
    };
    if config.report.output.is_some() {
        colored::control::set_override(false);
    }
    let rendered = match format {
        ReportFormat::Text => render_text(&issues, &report, root),
        ReportFormat::Json => render_json(&issues, &report)?,
        ReportFormat::Sarif => render_sarif(&issues, root),
    };

    match &config.report.output {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            if output_mode != OutputMode::Quiet {
                let counts = SeverityCounts::of(&issues);
                eprintln!("Report with {} issue(s) written to {}", counts.total(), path.display());
            }
        }
        None => print!("{}", rendered),
    }

    if let Some(threshold) = args.fail_on {
        if reaches_threshold(&issues, threshold) {
            return Ok(ExitCode::from(EXIT_FAIL_ON));
        }
    }
    Ok(ExitCode::SUCCESS)
}

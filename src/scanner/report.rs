use serde::Serialize;
use std::path::PathBuf;

use crate::issue::{Issue, IssueSet};
use crate::manifest::ManifestFacts;

/// Which rule entry point was running when something went wrong.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Manifest,
    RawText,
    ParsedTree,
    PreCheck,
    NodeStream,
    Reset,
    Finalize,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Manifest => "manifest",
            Phase::RawText => "raw_text",
            Phase::ParsedTree => "parsed_tree",
            Phase::PreCheck => "pre_check",
            Phase::NodeStream => "node_stream",
            Phase::Reset => "reset",
            Phase::Finalize => "finalize",
        }
    }
}

/// Recoverable, scan-level problems. None of these stop a scan.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    ManifestMissing,
    WalkFailed {
        path: Option<PathBuf>,
        reason: String,
    },
    ManifestUnparsable {
        path: PathBuf,
        reason: String,
    },
    FileUnreadable {
        path: PathBuf,
        reason: String,
    },
    ParseFailed {
        path: PathBuf,
        reason: String,
    },
    RuleFailed {
        rule: String,
        phase: Phase,
        file: Option<PathBuf>,
        reason: String,
    },
    RuleTimedOut {
        rule: String,
        phase: Phase,
        file: Option<PathBuf>,
        elapsed_ms: u64,
    },
}

impl Anomaly {
    pub fn summary(&self) -> String {
        match self {
            Anomaly::ManifestMissing => "no manifest found, using default SDK levels".to_string(),
            Anomaly::WalkFailed { path, reason } => match path {
                Some(path) => format!("{} not walked: {}", path.display(), reason),
                None => format!("project walk error: {}", reason),
            },
            Anomaly::ManifestUnparsable { path, reason } => {
                format!("manifest {} unparsable: {}", path.display(), reason)
            }
            Anomaly::FileUnreadable { path, reason } => {
                format!("{} unreadable: {}", path.display(), reason)
            }
            Anomaly::ParseFailed { path, reason } => {
                format!("{} not parsed: {}", path.display(), reason)
            }
            Anomaly::RuleFailed { rule, phase, file, reason } => match file {
                Some(file) => format!("rule {} failed in {} on {}: {}", rule, phase.as_str(), file.display(), reason),
                None => format!("rule {} failed in {}: {}", rule, phase.as_str(), reason),
            },
            Anomaly::RuleTimedOut { rule, phase, file, elapsed_ms } => match file {
                Some(file) => format!(
                    "rule {} exceeded its budget in {} on {} ({} ms)",
                    rule,
                    phase.as_str(),
                    file.display(),
                    elapsed_ms
                ),
                None => format!("rule {} exceeded its budget in {} ({} ms)", rule, phase.as_str(), elapsed_ms),
            },
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: usize,
    pub text_loads: usize,
    pub parses: usize,
    pub node_deliveries: usize,
}

/// Anomalies and counters accumulated while a scan runs.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub anomalies: Vec<Anomaly>,
    pub stats: ScanStats,
}

impl Diagnostics {
    pub fn record(&mut self, anomaly: Anomaly) {
        self.anomalies.push(anomaly);
    }
}

#[derive(Serialize, Debug)]
pub struct ScanReport {
    /// Every issue from every rule, in rule order. Not de-duplicated.
    pub issues: Vec<Issue>,
    pub anomalies: Vec<Anomaly>,
    pub stats: ScanStats,
    pub facts: ManifestFacts,
    pub rules: Vec<String>,
}

impl ScanReport {
    /// De-duplicated issues in display order.
    pub fn unique_issues(&self) -> Vec<Issue> {
        self.issues.iter().cloned().collect::<IssueSet>().into_sorted()
    }

    pub fn issues_from(&self, rule_category: &str) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.category() == rule_category)
    }
}

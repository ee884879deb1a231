use colored::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::issue::{Issue, Severity};
use crate::manifest::ManifestFacts;
use crate::scanner::{Anomaly, ScanReport, ScanStats};

/// Path shown to the user: relative to the scan root when possible.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn severity_badge(severity: Severity) -> ColoredString {
    match severity {
        Severity::Vulnerability => "VULN ".red().bold(),
        Severity::Warning => "WARN ".yellow(),
        Severity::Error => "ERROR".red(),
        Severity::Info => "INFO ".blue(),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub vulnerabilities: usize,
    pub warnings: usize,
    pub errors: usize,
    pub infos: usize,
}

impl SeverityCounts {
    pub fn of(issues: &[Issue]) -> Self {
        let mut counts = Self::default();
        for issue in issues {
            match issue.severity() {
                Severity::Vulnerability => counts.vulnerabilities += 1,
                Severity::Warning => counts.warnings += 1,
                Severity::Error => counts.errors += 1,
                Severity::Info => counts.infos += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.vulnerabilities + self.warnings + self.errors + self.infos
    }
}

/// Terminal listing grouped by file. `issues` must already be in display order.
pub fn render_text(issues: &[Issue], report: &ScanReport, root: &Path) -> String {
    let mut out = String::new();
    let mut by_file: BTreeMap<Option<String>, Vec<&Issue>> = BTreeMap::new();
    for issue in issues {
        by_file
            .entry(issue.file().map(|f| display_path(f, root)))
            .or_default()
            .push(issue);
    }

    for (file, file_issues) in &by_file {
        let header = file.as_deref().unwrap_or("(project)");
        let _ = writeln!(out, "\n{}", header.bold().cyan());
        for issue in file_issues {
            let location = issue.location().map(|l| format!(":{}", l)).unwrap_or_default();
            let _ = writeln!(
                out,
                "   {} [{}{}] {}",
                severity_badge(issue.severity()),
                issue.name().yellow(),
                location,
                issue.description()
            );
            if let Some(standard) = issue.standard_id() {
                let owasp = if issue.owasp_refs().is_empty() {
                    String::new()
                } else {
                    format!("OWASP {}", issue.owasp_refs().join(", "))
                };
                let _ = writeln!(out, "      {} {}", standard.dimmed(), owasp.dimmed());
            }
        }
    }

    let counts = SeverityCounts::of(issues);
    if counts.total() == 0 {
        let _ = writeln!(out, "\nNo issues found in {} file(s).", report.stats.files);
    } else {
        let _ = writeln!(
            out,
            "\n{} vulnerability(ies)  {} warning(s)  {} error(s)  {} info(s) in {} file(s)",
            counts.vulnerabilities.to_string().red().bold(),
            counts.warnings.to_string().yellow(),
            counts.errors.to_string().red(),
            counts.infos.to_string().blue(),
            report.stats.files
        );
    }
    if !report.anomalies.is_empty() {
        let _ = writeln!(
            out,
            "{}",
            format!("{} anomaly(ies) during the scan, rerun with -v for details", report.anomalies.len()).dimmed()
        );
    }
    out
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    summary: SeverityCounts,
    stats: &'a ScanStats,
    manifest: &'a ManifestFacts,
    rules: &'a [String],
    anomalies: &'a [Anomaly],
    issues: &'a [Issue],
}

pub fn render_json(issues: &[Issue], report: &ScanReport) -> anyhow::Result<String> {
    let out = JsonOutput {
        summary: SeverityCounts::of(issues),
        stats: &report.stats,
        manifest: &report.facts,
        rules: &report.rules,
        anomalies: &report.anomalies,
        issues,
    };
    Ok(serde_json::to_string_pretty(&out)?)
}

fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Vulnerability | Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "note",
    }
}

/// Renders a SARIF 2.1.0 log. Issue names become rule ids.
pub fn render_sarif(issues: &[Issue], root: &Path) -> String {
    let mut seen_rules: Vec<&Issue> = Vec::new();
    for issue in issues {
        if !seen_rules.iter().any(|r| r.name() == issue.name()) {
            seen_rules.push(issue);
        }
    }

    let rules_json: Vec<serde_json::Value> = seen_rules
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.name(),
                "shortDescription": { "text": r.name() },
                "properties": {
                    "category": r.category(),
                    "standard": r.standard_id(),
                    "owasp": r.owasp_refs(),
                }
            })
        })
        .collect();

    let results_json: Vec<serde_json::Value> = issues
        .iter()
        .map(|i| {
            let mut result = serde_json::json!({
                "ruleId": i.name(),
                "level": sarif_level(i.severity()),
                "message": { "text": i.description() },
            });
            if let Some(file) = i.file() {
                let start_line = i.location().map(|l| l.start_line()).unwrap_or(1).max(1);
                result["locations"] = serde_json::json!([{
                    "physicalLocation": {
                        "artifactLocation": {
                            "uri": display_path(file, root).replace('\\', "/"),
                            "uriBaseId": "%SRCROOT%"
                        },
                        "region": { "startLine": start_line }
                    }
                }]);
            }
            result
        })
        .collect();

    let sarif = serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "droidscan",
                    "version": env!("CARGO_PKG_VERSION"),
                    "rules": rules_json
                }
            },
            "results": results_json
        }]
    });

    serde_json::to_string_pretty(&sarif).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::Location;

    fn sample() -> Vec<Issue> {
        vec![
            Issue::new("file", "Hardcoded HTTP URL found", Severity::Vulnerability, "http")
                .in_file("/proj/src/Api.java")
                .at(Location::Point { line: 23, column: 5 })
                .with_standard("MSTG-NETWORK-1", "tls"),
            Issue::new("file", "Logging statements detected", Severity::Warning, "logs"),
        ]
    }

    fn report() -> ScanReport {
        ScanReport {
            issues: sample(),
            anomalies: vec![Anomaly::ManifestMissing],
            stats: ScanStats {
                files: 3,
                ..ScanStats::default()
            },
            facts: ManifestFacts::default(),
            rules: vec!["http_url_hardcoded".to_string()],
        }
    }

    #[test]
    fn test_render_sarif_produces_valid_structure() {
        let sarif = render_sarif(&sample(), Path::new("/proj"));
        let parsed: serde_json::Value = serde_json::from_str(&sarif).expect("must be valid JSON");
        assert_eq!(parsed["version"], "2.1.0");
        let results = &parsed["runs"][0]["results"];
        assert_eq!(results[0]["ruleId"], "Hardcoded HTTP URL found");
        assert_eq!(results[0]["level"], "error");
        assert_eq!(
            results[0]["locations"][0]["physicalLocation"]["artifactLocation"]["uri"],
            "src/Api.java"
        );
        assert_eq!(results[0]["locations"][0]["physicalLocation"]["region"]["startLine"], 23);
        assert!(results[1].get("locations").is_none());
        assert_eq!(parsed["runs"][0]["tool"]["driver"]["rules"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_render_json_counts() {
        let issues = sample();
        let json = render_json(&issues, &report()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["summary"]["vulnerabilities"], 1);
        assert_eq!(parsed["summary"]["warnings"], 1);
        assert_eq!(parsed["anomalies"][0]["kind"], "manifest_missing");
        assert_eq!(parsed["manifest"]["min_sdk"], 1);
    }

    #[test]
    fn test_render_text_groups_by_file() {
        colored::control::set_override(false);
        let text = render_text(&sample(), &report(), Path::new("/proj"));
        assert!(text.contains("src/Api.java"));
        assert!(text.contains("[Hardcoded HTTP URL found:23:5]"));
        assert!(text.contains("(project)"));
        assert!(text.contains("1 anomaly(ies)"));
    }
}

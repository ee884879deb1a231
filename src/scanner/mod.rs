//! Scan orchestration.
//!
//! One scan runs the manifest pass once, then processes the work set file by
//! file: raw-text rules, tree rules and node streaming share a single lazily
//! built [`FileContext`], which is reset before the next file starts. After the
//! last file every rule is finalized and issues are collected in rule order.

mod dispatch;
mod guard;
pub mod lifecycle;
pub mod report;
pub mod work_set;

pub use lifecycle::{FileContext, FileState, FsLoader, JavaParser, ParseFailure, SourceLoader, SourceParser};
pub use report::{Anomaly, Diagnostics, Phase, ScanReport, ScanStats};
pub use work_set::{WalkOptions, WorkSet};

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::issue::Issue;
use crate::manifest::{ManifestFacts, ManifestStatus};
use crate::rules::{ParsedSource, Rule, RuleRegistry, RuleSelection, SourceFile};
use guard::{call_rule, check_budget};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Per-rule, per-file time budget. `None` disables the check.
    pub rule_budget: Option<Duration>,
    /// Path components excluded from the work set.
    pub ignore_patterns: Vec<String>,
    pub respect_ignore_files: bool,
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub source: PathBuf,
    /// Explicit manifest. When absent the work set is searched.
    pub manifest: Option<PathBuf>,
    pub selection: RuleSelection,
    pub options: ScanOptions,
}

impl ScanRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            manifest: None,
            selection: RuleSelection::default(),
            options: ScanOptions::default(),
        }
    }
}

/// Progress notification, sent once per file before it is processed.
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress<'a> {
    pub index: usize,
    pub total: usize,
    pub path: &'a Path,
}

pub struct Scanner {
    registry: RuleRegistry,
    loader: Box<dyn SourceLoader>,
    parser: Box<dyn SourceParser>,
}

impl Scanner {
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            loader: Box::new(FsLoader),
            parser: Box::new(JavaParser),
        }
    }

    pub fn with_builtin_rules() -> Result<Self, ScanError> {
        Ok(Self::new(RuleRegistry::with_builtin()?))
    }

    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_parser(mut self, parser: impl SourceParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn run(&self, request: &ScanRequest) -> Result<ScanReport, ScanError> {
        self.run_with_progress(request, |_| {})
    }

    pub fn run_with_progress(
        &self,
        request: &ScanRequest,
        mut progress: impl FnMut(ScanProgress<'_>),
    ) -> Result<ScanReport, ScanError> {
        let walk = WalkOptions {
            ignore_patterns: request.options.ignore_patterns.clone(),
            respect_ignore_files: request.options.respect_ignore_files,
        };
        let work_set = WorkSet::gather(&request.source, &walk)?;
        let mut diag = Diagnostics::default();
        for anomaly in work_set.errors() {
            diag.record(anomaly.clone());
        }

        let manifest_path = request
            .manifest
            .clone()
            .or_else(|| work_set.find_manifest().map(Path::to_path_buf));
        let manifest = ManifestStatus::load(manifest_path.as_deref());
        match &manifest {
            ManifestStatus::Parsed(_) => {}
            ManifestStatus::Missing => diag.record(Anomaly::ManifestMissing),
            ManifestStatus::Unparsable { path, reason } => diag.record(Anomaly::ManifestUnparsable {
                path: path.clone(),
                reason: reason.clone(),
            }),
        }
        let facts = manifest.facts();

        let mut rules = self.registry.instantiate(&request.selection)?;
        let budget = request.options.rule_budget;

        if let Some(parsed) = manifest.manifest() {
            for rule in rules.iter_mut() {
                let id = rule.id();
                let Some(manifest_rule) = rule.as_manifest() else {
                    continue;
                };
                let outcome = call_rule(id, Phase::Manifest, Some(parsed.path()), &mut diag, || {
                    manifest_rule.check_manifest(parsed)
                });
                check_budget(id, Phase::Manifest, Some(parsed.path()), outcome.elapsed, budget, &mut diag);
            }
        } else {
            warn!("Manifest rules skipped, per-file rules use default SDK levels");
        }

        let total = work_set.len();
        for (index, path) in work_set.iter().enumerate() {
            progress(ScanProgress { index, total, path });
            self.scan_file(path, &mut rules, &facts, budget, &mut diag);
            diag.stats.files += 1;
        }

        for rule in rules.iter_mut() {
            let id = rule.id();
            call_rule(id, Phase::Finalize, None, &mut diag, || rule.finalize());
        }

        let issues = collect_issues(&mut rules);
        info!(
            files = diag.stats.files,
            issues = issues.len(),
            anomalies = diag.anomalies.len(),
            "Scan finished"
        );

        Ok(ScanReport {
            issues,
            anomalies: diag.anomalies,
            stats: diag.stats,
            facts,
            rules: rules.iter().map(|r| r.id().to_string()).collect(),
        })
    }

    fn scan_file(
        &self,
        path: &Path,
        rules: &mut [Box<dyn Rule>],
        facts: &ManifestFacts,
        budget: Option<Duration>,
        diag: &mut Diagnostics,
    ) {
        let mut ctx = FileContext::new(path);
        debug!(file = %path.display(), "Scanning file");

        let wants_text = rules.iter_mut().any(|r| r.as_raw_text().is_some());
        if wants_text && ctx.ensure_text(self.loader.as_ref(), diag) {
            let file = SourceFile {
                path,
                text: ctx.text().unwrap_or_default(),
                facts,
            };
            for rule in rules.iter_mut() {
                let id = rule.id();
                let Some(text_rule) = rule.as_raw_text() else {
                    continue;
                };
                let outcome = call_rule(id, Phase::RawText, Some(path), diag, || text_rule.check_text(&file));
                check_budget(id, Phase::RawText, Some(path), outcome.elapsed, budget, diag);
            }
        }

        let wants_tree = ctx.is_source()
            && rules
                .iter_mut()
                .any(|r| r.as_tree().is_some() || r.as_node().is_some());
        if wants_tree && ctx.ensure_tree(self.loader.as_ref(), self.parser.as_ref(), diag) {
            if let (Some(text), Some(tree)) = (ctx.text(), ctx.tree()) {
                let source = ParsedSource {
                    path,
                    text,
                    tree,
                    facts,
                };
                for rule in rules.iter_mut() {
                    let id = rule.id();
                    let Some(tree_rule) = rule.as_tree() else {
                        continue;
                    };
                    let outcome = call_rule(id, Phase::ParsedTree, Some(path), diag, || tree_rule.check_tree(&source));
                    check_budget(id, Phase::ParsedTree, Some(path), outcome.elapsed, budget, diag);
                }
                dispatch::dispatch_nodes(rules, &source, budget, diag);
            }
        }
        ctx.mark_dispatched();

        for rule in rules.iter_mut() {
            let id = rule.id();
            call_rule(id, Phase::Reset, Some(path), diag, || {
                rule.reset();
                Ok(())
            });
        }
        ctx.reset();
    }
}

/// Concatenates every rule's issues in rule order. No de-duplication here.
pub fn collect_issues(rules: &mut [Box<dyn Rule>]) -> Vec<Issue> {
    rules.iter_mut().flat_map(|rule| rule.take_issues()).collect()
}

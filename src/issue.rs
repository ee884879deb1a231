//! Finding model shared by every rule.
//!
//! An [`Issue`] is built once by the rule that detects it and is read-only afterwards.
//! Identity for de-duplication is `(name, file, location)`: two issues with the same
//! triple are the same finding even when their descriptions differ.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::exploit::ExploitPayload;

/// Display priority for severities that are not recognised.
pub const UNRANKED_PRIORITY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Vulnerability,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Vulnerability,
        Severity::Warning,
        Severity::Error,
        Severity::Info,
    ];

    /// Fixed report order: Vulnerability, Warning, Error, Info.
    ///
    /// This is a display table, not a risk ranking. Error deliberately sits below Warning.
    pub fn display_priority(self) -> u8 {
        match self {
            Severity::Vulnerability => 1,
            Severity::Warning => 2,
            Severity::Error => 3,
            Severity::Info => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Vulnerability => "vulnerability",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity '{0}' (expected info, warning, error or vulnerability)")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "vulnerability" | "vuln" => Ok(Severity::Vulnerability),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = UnknownSeverity;

    fn try_from(label: String) -> Result<Self, <Severity as TryFrom<String>>::Error> {
        label.parse()
    }
}

/// Display priority of a raw severity label; unknown labels sort last.
pub fn label_priority(label: &str) -> u8 {
    label
        .parse::<Severity>()
        .map(Severity::display_priority)
        .unwrap_or(UNRANKED_PRIORITY)
}

/// Where in a file an issue was found. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Point { line: usize, column: usize },
    Lines { start: usize, end: usize },
}

impl Location {
    pub fn line(line: usize) -> Self {
        Location::Point { line, column: 0 }
    }

    pub fn start_line(&self) -> usize {
        match *self {
            Location::Point { line, .. } => line,
            Location::Lines { start, .. } => start,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Location::Point { line, column: 0 } => write!(f, "{}", line),
            Location::Point { line, column } => write!(f, "{}:{}", line, column),
            Location::Lines { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    category: String,
    name: String,
    severity: Severity,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exploit: Option<ExploitPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    standard_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    standard_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    owasp_refs: Vec<String>,
}

impl Issue {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            severity,
            description: description.into(),
            location: None,
            file: None,
            exploit: None,
            standard_id: None,
            standard_description: None,
            owasp_refs: Vec::new(),
        }
    }

    pub fn in_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_standard(mut self, id: &str, description: &str) -> Self {
        self.standard_id = Some(id.to_string());
        self.standard_description = Some(description.to_string());
        self
    }

    pub fn with_owasp(mut self, refs: &[&str]) -> Self {
        self.owasp_refs = refs.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_exploit(mut self, payload: ExploitPayload) -> Self {
        self.exploit = Some(payload);
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn exploit(&self) -> Option<&ExploitPayload> {
        self.exploit.as_ref()
    }

    pub fn standard_id(&self) -> Option<&str> {
        self.standard_id.as_deref()
    }

    pub fn standard_description(&self) -> Option<&str> {
        self.standard_description.as_deref()
    }

    pub fn owasp_refs(&self) -> &[String] {
        &self.owasp_refs
    }

    pub fn key(&self) -> IssueKey {
        IssueKey {
            name: self.name.clone(),
            file: self.file.clone(),
            location: self.location,
        }
    }
}

impl PartialEq for Issue {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.file == other.file && self.location == other.location
    }
}

impl Eq for Issue {}

impl Hash for Issue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.file.hash(state);
        self.location.hash(state);
    }
}

/// Identity triple of an [`Issue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueKey {
    pub name: String,
    pub file: Option<PathBuf>,
    pub location: Option<Location>,
}

/// Insertion-ordered, uniqueness-aware issue collection keyed on [`IssueKey`].
///
/// The first issue inserted for a key wins; later duplicates are dropped.
#[derive(Debug, Default)]
pub struct IssueSet {
    seen: HashSet<IssueKey>,
    issues: Vec<Issue>,
}

impl IssueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, issue: Issue) -> bool {
        if self.seen.insert(issue.key()) {
            self.issues.push(issue);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    /// Consumes the set and returns its issues in display order.
    pub fn into_sorted(self) -> Vec<Issue> {
        let mut issues = self.issues;
        sort_for_display(&mut issues);
        issues
    }
}

impl Extend<Issue> for IssueSet {
    fn extend<T: IntoIterator<Item = Issue>>(&mut self, iter: T) {
        for issue in iter {
            self.insert(issue);
        }
    }
}

impl FromIterator<Issue> for IssueSet {
    fn from_iter<T: IntoIterator<Item = Issue>>(iter: T) -> Self {
        let mut set = IssueSet::new();
        set.extend(iter);
        set
    }
}

/// Stable sort by [`Severity::display_priority`].
pub fn sort_for_display(issues: &mut [Issue]) {
    issues.sort_by_key(|issue| issue.severity().display_priority());
}

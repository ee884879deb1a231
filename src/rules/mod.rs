//! Rule capability model.
//!
//! A rule is one detection unit. It declares which inputs it can consume by
//! returning itself from the matching `as_*` accessor; the scanner only hands a
//! rule the data for capabilities it exposes.

pub mod java;
pub mod registry;

pub use registry::{RuleEntry, RuleRegistry, RuleSelection};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tree_sitter::{Node, Tree};

use crate::error::ScanError;
use crate::issue::{Issue, Location, Severity};
use crate::manifest::{Manifest, ManifestFacts};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Manifest,
    Broadcast,
    File,
    Crypto,
    Intent,
    Cert,
    Webview,
    Generic,
}

impl Category {
    /// Load order. Manifest always comes first so its facts exist before per-file rules run.
    pub const LOAD_ORDER: [Category; 8] = [
        Category::Manifest,
        Category::Broadcast,
        Category::File,
        Category::Crypto,
        Category::Intent,
        Category::Cert,
        Category::Webview,
        Category::Generic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Manifest => "manifest",
            Category::Broadcast => "broadcast",
            Category::File => "file",
            Category::Crypto => "crypto",
            Category::Intent => "intent",
            Category::Cert => "cert",
            Category::Webview => "webview",
            Category::Generic => "generic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::LOAD_ORDER
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ScanError::UnknownCategory(s.to_string()))
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    RawText,
    ParsedTree,
    NodeStream,
    Manifest,
}

impl Capability {
    pub fn label(self) -> &'static str {
        match self {
            Capability::RawText => "raw-text",
            Capability::ParsedTree => "tree",
            Capability::NodeStream => "nodes",
            Capability::Manifest => "manifest",
        }
    }
}

/// One file's decoded text.
pub struct SourceFile<'a> {
    pub path: &'a Path,
    pub text: &'a str,
    pub facts: &'a ManifestFacts,
}

/// One source file with its successfully parsed tree.
pub struct ParsedSource<'a> {
    pub path: &'a Path,
    pub text: &'a str,
    pub tree: &'a Tree,
    pub facts: &'a ManifestFacts,
}

impl<'a> ParsedSource<'a> {
    pub fn node_text(&self, node: Node<'_>) -> &'a str {
        java::node_text(node, self.text)
    }

    pub fn location(&self, node: Node<'_>) -> Location {
        java::location(node)
    }
}

pub trait RawTextRule {
    fn check_text(&mut self, file: &SourceFile<'_>) -> anyhow::Result<()>;
}

pub trait TreeRule {
    fn check_tree(&mut self, source: &ParsedSource<'_>) -> anyhow::Result<()>;
}

pub trait NodeRule {
    /// Evaluated once per file before the traversal. Returning `false` skips the file.
    fn wants(&self, _source: &ParsedSource<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Called once per named node, in pre-order. `ancestors` runs from the root
    /// down to the node's parent.
    fn visit<'t>(
        &mut self,
        ancestors: &[Node<'t>],
        node: Node<'t>,
        source: &ParsedSource<'t>,
    ) -> anyhow::Result<()>;
}

pub trait ManifestRule {
    fn check_manifest(&mut self, manifest: &Manifest) -> anyhow::Result<()>;
}

/// State shared by every rule implementation: identity plus the issues it has emitted.
#[derive(Debug)]
pub struct RuleCore {
    pub id: &'static str,
    pub category: Category,
    pub description: &'static str,
    issues: Vec<Issue>,
}

impl RuleCore {
    pub fn new(id: &'static str, category: Category, description: &'static str) -> Self {
        Self {
            id,
            category,
            description,
            issues: Vec::new(),
        }
    }

    /// Starts an issue in this rule's category.
    pub fn issue(&self, name: impl Into<String>, severity: Severity, description: impl Into<String>) -> Issue {
        Issue::new(self.category.as_str(), name, severity, description)
    }

    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn take_issues(&mut self) -> Vec<Issue> {
        std::mem::take(&mut self.issues)
    }
}

pub trait Rule: Send {
    fn core(&self) -> &RuleCore;
    fn core_mut(&mut self) -> &mut RuleCore;

    fn id(&self) -> &'static str {
        self.core().id
    }

    fn category(&self) -> Category {
        self.core().category
    }

    fn description(&self) -> &'static str {
        self.core().description
    }

    fn issues(&self) -> &[Issue] {
        self.core().issues()
    }

    fn take_issues(&mut self) -> Vec<Issue> {
        self.core_mut().take_issues()
    }

    fn as_raw_text(&mut self) -> Option<&mut dyn RawTextRule> {
        None
    }

    fn as_tree(&mut self) -> Option<&mut dyn TreeRule> {
        None
    }

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
        None
    }

    fn as_manifest(&mut self) -> Option<&mut dyn ManifestRule> {
        None
    }

    /// Clears per-file state. Accumulated issues survive.
    fn reset(&mut self) {}

    /// Runs once after the last file.
    fn finalize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn capabilities(&mut self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.as_manifest().is_some() {
            caps.push(Capability::Manifest);
        }
        if self.as_raw_text().is_some() {
            caps.push(Capability::RawText);
        }
        if self.as_tree().is_some() {
            caps.push(Capability::ParsedTree);
        }
        if self.as_node().is_some() {
            caps.push(Capability::NodeStream);
        }
        caps
    }
}

/// Implements the `core`/`core_mut` accessors for a rule struct with a `core: RuleCore` field.
#[macro_export]
macro_rules! rule_core {
    () => {
        fn core(&self) -> &$crate::rules::RuleCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::rules::RuleCore {
            &mut self.core
        }
    };
}

//! Credential-like string literals.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::issue::Severity;
use crate::rule_core;
use crate::rules::java;
use crate::rules::{Category, NodeRule, ParsedSource, Rule, RuleCore};

static CREDENTIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passwd|pwd|api[_-]?key|access[_-]?token|secret|username)").unwrap()
});

pub struct HardcodedCredentials {
    core: RuleCore,
}

impl HardcodedCredentials {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "hardcoded_credentials",
                Category::Generic,
                "String literals that mention passwords, tokens or secrets",
            ),
        })
    }
}

impl NodeRule for HardcodedCredentials {
    fn visit<'t>(
        &mut self,
        _ancestors: &[Node<'t>],
        node: Node<'t>,
        source: &ParsedSource<'t>,
    ) -> anyhow::Result<()> {
        let Some(value) = java::string_value(node, source.text) else {
            return Ok(());
        };
        let Some(found) = CREDENTIAL_RE.find(value) else {
            return Ok(());
        };

        let issue = self
            .core
            .issue(
                "Hardcoded credentials detected",
                Severity::Vulnerability,
                format!(
                    "A string literal mentions '{}'. Credentials embedded in the app can be recovered by \
                     anyone who decompiles it. Load them at runtime from a secure source.",
                    found.as_str()
                ),
            )
            .in_file(source.path)
            .at(source.location(node))
            .with_standard("MSTG-STORAGE-3", "No credentials are hardcoded in the application.")
            .with_owasp(&["M2", "M9"]);
        self.core.push(issue);
        Ok(())
    }
}

impl Rule for HardcodedCredentials {
    rule_core!();

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
        Some(self)
    }
}

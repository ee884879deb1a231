//! WebView settings that widen the attack surface.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator};

use crate::issue::{Location, Severity};
use crate::rule_core;
use crate::rules::java::{self, MethodCall};
use crate::rules::{Category, NodeRule, ParsedSource, Rule, RuleCore, TreeRule};

/// Name of the WebView a settings call applies to: `web` for `web.getSettings().x()`.
fn settings_owner<'a>(call: &MethodCall<'_, 'a>, text: &'a str) -> Option<&'a str> {
    let object = call.object?;
    match MethodCall::from_node(object, text) {
        Some(inner) if inner.name == "getSettings" => inner.object_text(text),
        _ => Some(java::node_text(object, text)),
    }
}

pub struct JavascriptEnabled {
    core: RuleCore,
}

impl JavascriptEnabled {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "javascript_enabled",
                Category::Webview,
                "WebViews with JavaScript enabled",
            ),
        })
    }
}

impl NodeRule for JavascriptEnabled {
    fn wants(&self, source: &ParsedSource<'_>) -> anyhow::Result<bool> {
        Ok(source.text.contains("setJavaScriptEnabled"))
    }

    fn visit<'t>(
        &mut self,
        _ancestors: &[Node<'t>],
        node: Node<'t>,
        source: &ParsedSource<'t>,
    ) -> anyhow::Result<()> {
        let Some(call) = MethodCall::from_node(node, source.text) else {
            return Ok(());
        };
        if call.name != "setJavaScriptEnabled"
            || !call.argument(0).is_some_and(|a| java::is_bool_literal(a, true))
        {
            return Ok(());
        }
        let owner = settings_owner(&call, source.text).unwrap_or("unknown");

        let issue = self
            .core
            .issue(
                format!("JavaScript enabled in '{}'", owner),
                Severity::Vulnerability,
                "JavaScript is enabled in a WebView. If the WebView loads untrusted content this opens the \
                 door to cross-site scripting and, combined with addJavascriptInterface, to code execution. \
                 Enable JavaScript only for trusted content.",
            )
            .in_file(source.path)
            .at(source.location(node))
            .with_standard("MSTG-PLATFORM-6", "WebViews have JavaScript disabled unless required.")
            .with_owasp(&["M10"]);
        self.core.push(issue);
        Ok(())
    }
}

impl Rule for JavascriptEnabled {
    rule_core!();

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
        Some(self)
    }
}

const METHOD_QUERY: &str = "(method_declaration) @method";

/// WebViews declared in a method that never call `setAllowFileAccess(false)`.
pub struct AllowFileAccess {
    core: RuleCore,
    query: Option<Query>,
}

impl AllowFileAccess {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "allow_file_access",
                Category::Webview,
                "WebViews that keep file:// access enabled",
            ),
            query: None,
        })
    }

    /// WebView locals of one method that are left with file access on, with their lines.
    fn unsafe_webviews<'a>(method: Node<'_>, text: &'a str) -> BTreeMap<&'a str, usize> {
        let mut webviews: BTreeMap<&str, usize> = BTreeMap::new();
        let mut settings_aliases: HashMap<&str, &str> = HashMap::new();
        let mut disabled: Vec<&str> = Vec::new();

        for node in java::descendants(method) {
            match node.kind() {
                "local_variable_declaration" => {
                    let Some(type_node) = node.child_by_field_name("type") else {
                        continue;
                    };
                    let is_webview = java::simple_type_name(java::node_text(type_node, text)) == "WebView";
                    let mut cursor = node.walk();
                    for declarator in node.children_by_field_name("declarator", &mut cursor) {
                        let Some(name) = declarator.child_by_field_name("name") else {
                            continue;
                        };
                        let name = java::node_text(name, text);
                        if is_webview {
                            webviews.insert(name, node.start_position().row + 1);
                        }
                        let owner = declarator
                            .child_by_field_name("value")
                            .and_then(|v| MethodCall::from_node(v, text))
                            .filter(|c| c.name == "getSettings")
                            .and_then(|c| c.object_text(text));
                        if let Some(owner) = owner {
                            settings_aliases.insert(name, owner);
                        }
                    }
                }
                "method_invocation" => {
                    let Some(call) = MethodCall::from_node(node, text) else {
                        continue;
                    };
                    if call.name != "setAllowFileAccess"
                        || !call.argument(0).is_some_and(|a| java::is_bool_literal(a, false))
                    {
                        continue;
                    }
                    if let Some(owner) = settings_owner(&call, text) {
                        disabled.push(settings_aliases.get(owner).copied().unwrap_or(owner));
                    }
                }
                _ => {}
            }
        }

        webviews.retain(|name, _| !disabled.contains(name));
        webviews
    }
}

impl TreeRule for AllowFileAccess {
    fn check_tree(&mut self, source: &ParsedSource<'_>) -> anyhow::Result<()> {
        if !source.text.contains("WebView") {
            return Ok(());
        }
        if self.query.is_none() {
            self.query = Some(Query::new(&tree_sitter_java::LANGUAGE.into(), METHOD_QUERY)?);
        }
        let Some(query) = self.query.as_ref() else {
            return Ok(());
        };

        let mut methods = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut captures = cursor.captures(query, source.tree.root_node(), source.text.as_bytes());
        while let Some((m, _)) = captures.next() {
            for capture in m.captures {
                methods.push(capture.node);
            }
        }

        for method in methods {
            for (name, line) in Self::unsafe_webviews(method, source.text) {
                debug!(webview = name, line, "WebView keeps file access enabled");
                let issue = self
                    .core
                    .issue(
                        "WebView enables file access",
                        Severity::Vulnerability,
                        format!(
                            "WebView '{}' does not call setAllowFileAccess(false). File access is enabled by \
                             default on API 29 and lower, letting loaded content read local files through \
                             file:// URLs.",
                            name
                        ),
                    )
                    .in_file(source.path)
                    .at(Location::line(line))
                    .with_standard("MSTG-PLATFORM-6", "WebViews have file access disabled unless required.")
                    .with_owasp(&["M10"]);
                self.core.push(issue);
            }
        }
        Ok(())
    }
}

impl Rule for AllowFileAccess {
    rule_core!();

    fn as_tree(&mut self) -> Option<&mut dyn TreeRule> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestFacts;
    use crate::rules::java::testing::{named_nodes, parse};
    use std::path::Path;

    const SOURCE: &str = r#"
class Browser extends Activity {
    void open() {
        WebView safe = new WebView(this);
        WebSettings settings = safe.getSettings();
        settings.setAllowFileAccess(false);
        settings.setJavaScriptEnabled(true);

        WebView direct = new WebView(this);
        direct.getSettings().setAllowFileAccess(false);

        WebView leaky = new WebView(this);
        leaky.getSettings().setJavaScriptEnabled(true);
    }
}
"#;

    fn source<'a>(tree: &'a tree_sitter::Tree, facts: &'a ManifestFacts) -> ParsedSource<'a> {
        ParsedSource {
            path: Path::new("Browser.java"),
            text: SOURCE,
            tree,
            facts,
        }
    }

    #[test]
    fn test_javascript_enabled_names_the_webview() {
        let tree = parse(SOURCE);
        let facts = ManifestFacts::default();
        let source = source(&tree, &facts);
        let mut rule = JavascriptEnabled::boxed();
        let node_rule = rule.as_node().unwrap();
        for node in named_nodes(&tree) {
            node_rule.visit(&[], node, &source).unwrap();
        }
        let names: Vec<&str> = rule.issues().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["JavaScript enabled in 'settings'", "JavaScript enabled in 'leaky'"]);
    }

    #[test]
    fn test_file_access_tracks_settings_aliases() {
        let tree = parse(SOURCE);
        let facts = ManifestFacts::default();
        let source = source(&tree, &facts);
        let mut rule = AllowFileAccess::boxed();
        rule.as_tree().unwrap().check_tree(&source).unwrap();
        let issues = rule.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location(), Some(Location::line(12)));
        assert!(issues[0].description().contains("'leaky'"));
    }
}

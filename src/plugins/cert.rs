//! Certificate and hostname validation that accepts anything.

use tree_sitter::Node;

use crate::issue::Severity;
use crate::rule_core;
use crate::rules::java::{self, Construction, MethodCall};
use crate::rules::{Category, NodeRule, ParsedSource, Rule, RuleCore};

const PERMISSIVE_VERIFIERS: [&str; 3] = ["AllowAllHostnameVerifier", "NullHostNameVerifier", "NullHostnameVerifier"];
const ALLOW_ALL_CONSTANT: &str = "ALLOW_ALL_HOSTNAME_VERIFIER";

/// `true` for a method body consisting only of `return true;`.
fn returns_true_only(method: Node<'_>) -> bool {
    let Some(body) = method.child_by_field_name("body") else {
        return false;
    };
    let statements = java::named_children(body);
    if statements.len() != 1 || statements[0].kind() != "return_statement" {
        return false;
    }
    java::named_children(statements[0])
        .first()
        .is_some_and(|value| java::is_bool_literal(*value, true))
}

pub struct HostnameVerifier {
    core: RuleCore,
}

impl HostnameVerifier {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "hostname_verifier",
                Category::Cert,
                "Hostname verifiers that accept every host",
            ),
        })
    }

    fn finding(node: Node<'_>, source: &ParsedSource<'_>) -> Option<String> {
        match node.kind() {
            "object_creation_expression" => {
                let creation = Construction::from_node(node, source.text)?;
                PERMISSIVE_VERIFIERS
                    .contains(&creation.type_name)
                    .then(|| format!("A {} is instantiated.", creation.type_name))
            }
            "method_invocation" => {
                let call = MethodCall::from_node(node, source.text)?;
                let setter = matches!(call.name, "setHostnameVerifier" | "setDefaultHostnameVerifier");
                let allow_all = call
                    .arguments
                    .iter()
                    .any(|a| source.node_text(*a).contains(ALLOW_ALL_CONSTANT));
                (setter && allow_all).then(|| format!("{} is called with {}.", call.name, ALLOW_ALL_CONSTANT))
            }
            "method_declaration" => {
                let name = source.node_text(node.child_by_field_name("name")?);
                (name == "verify" && returns_true_only(node))
                    .then(|| "A verify method unconditionally returns true.".to_string())
            }
            _ => None,
        }
    }
}

impl NodeRule for HostnameVerifier {
    fn visit<'t>(
        &mut self,
        _ancestors: &[Node<'t>],
        node: Node<'t>,
        source: &ParsedSource<'t>,
    ) -> anyhow::Result<()> {
        let Some(what) = Self::finding(node, source) else {
            return Ok(());
        };
        let issue = self
            .core
            .issue(
                "Insecure hostname verification",
                Severity::Vulnerability,
                format!(
                    "{} Hostname verification is effectively disabled, which allows man-in-the-middle \
                     attacks with any valid certificate. Use the default HostnameVerifier.",
                    what
                ),
            )
            .in_file(source.path)
            .at(source.location(node))
            .with_standard("MSTG-NETWORK-5", "The app verifies the hostname of the remote endpoint.")
            .with_owasp(&["M3"]);
        self.core.push(issue);
        Ok(())
    }
}

impl Rule for HostnameVerifier {
    rule_core!();

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
        Some(self)
    }
}

//! PendingIntents wrapping implicit intents.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::issue::Severity;
use crate::rule_core;
use crate::rules::java::{self, Construction, MethodCall};
use crate::rules::{Category, NodeRule, ParsedSource, Rule, RuleCore};

const PENDING_INTENT_FACTORIES: [&str; 4] = ["getActivity", "getActivities", "getService", "getBroadcast"];

static NEW_INTENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"new\s+Intent\b").unwrap());

/// `new Intent()` and `new Intent(action)` name no target component.
fn is_implicit_intent(node: Node<'_>, text: &str) -> bool {
    Construction::from_node(node, text)
        .map(|c| c.type_name == "Intent" && c.arguments.len() <= 1)
        .unwrap_or(false)
}

pub struct ImplicitPendingIntent {
    core: RuleCore,
}

impl ImplicitPendingIntent {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "implicit_pending_intent",
                Category::Intent,
                "PendingIntent created from an implicit Intent",
            ),
        })
    }
}

impl NodeRule for ImplicitPendingIntent {
    fn wants(&self, source: &ParsedSource<'_>) -> anyhow::Result<bool> {
        Ok(NEW_INTENT_RE.is_match(source.text)
            && source.text.contains("PendingIntent")
            && PENDING_INTENT_FACTORIES.iter().any(|f| source.text.contains(f)))
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
        if !call.is_on("PendingIntent", source.text) || !PENDING_INTENT_FACTORIES.contains(&call.name) {
            return Ok(());
        }
        let implicit = call.arguments.iter().any(|arg| {
            is_implicit_intent(*arg, source.text)
                || java::descendants(*arg)
                    .into_iter()
                    .any(|n| is_implicit_intent(n, source.text))
        });
        if !implicit {
            return Ok(());
        }

        let issue = self
            .core
            .issue(
                "Implicit Intent used for PendingIntent",
                Severity::Vulnerability,
                format!(
                    "PendingIntent.{} wraps an implicit Intent. A malicious app can intercept it and, \
                     because the PendingIntent runs with this app's identity, fill in the target to \
                     reach protected components. Set an explicit component or package on the Intent \
                     and use FLAG_IMMUTABLE.",
                    call.name
                ),
            )
            .in_file(source.path)
            .at(source.location(node))
            .with_standard(
                "MSTG-PLATFORM-6",
                "PendingIntents must wrap explicit intents to avoid hijacking.",
            )
            .with_owasp(&["M1"]);
        self.core.push(issue);
        Ok(())
    }
}

impl Rule for ImplicitPendingIntent {
    rule_core!();

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
        Some(self)
    }
}

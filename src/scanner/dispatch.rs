//! Single-pass node streaming to every interested rule.

use std::time::Duration;
use tracing::{debug, trace};
use tree_sitter::Node;

use super::guard::{call_rule, check_budget};
use super::report::{Diagnostics, Phase};
use crate::rules::{ParsedSource, Rule};

struct Subscriber {
    index: usize,
    spent: Duration,
    live: bool,
}

/// Builds the subscriber set for this file (one guarded pre-check per node rule)
/// and walks the tree once, offering each named node to every live subscriber in
/// the same order. Returns the number of deliveries made.
pub(crate) fn dispatch_nodes(
    rules: &mut [Box<dyn Rule>],
    source: &ParsedSource<'_>,
    budget: Option<Duration>,
    diag: &mut Diagnostics,
) -> usize {
    let mut subscribers = Vec::new();
    for (index, rule) in rules.iter_mut().enumerate() {
        let id = rule.id();
        let Some(node_rule) = rule.as_node() else {
            continue;
        };
        let wants = call_rule(id, Phase::PreCheck, Some(source.path), diag, || node_rule.wants(source));
        if wants.value == Some(true) {
            subscribers.push(Subscriber {
                index,
                spent: Duration::ZERO,
                live: true,
            });
        } else {
            trace!(rule = id, file = %source.path.display(), "Pre-check declined file");
        }
    }

    if subscribers.is_empty() {
        return 0;
    }

    let mut deliveries = 0;
    let mut ancestors: Vec<Node<'_>> = Vec::new();
    let mut cursor = source.tree.walk();

    'walk: loop {
        let node = cursor.node();
        if node.is_named() {
            deliveries += deliver(rules, &mut subscribers, &ancestors, node, source, budget, diag);
            if subscribers.iter().all(|s| !s.live) {
                debug!(file = %source.path.display(), "Every subscriber dropped out, stopping traversal");
                break 'walk;
            }
        }

        if cursor.goto_first_child() {
            ancestors.push(node);
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                break 'walk;
            }
            ancestors.pop();
        }
    }

    diag.stats.node_deliveries += deliveries;
    deliveries
}

fn deliver<'t>(
    rules: &mut [Box<dyn Rule>],
    subscribers: &mut [Subscriber],
    ancestors: &[Node<'t>],
    node: Node<'t>,
    source: &ParsedSource<'t>,
    budget: Option<Duration>,
    diag: &mut Diagnostics,
) -> usize {
    let mut delivered = 0;
    for sub in subscribers.iter_mut().filter(|s| s.live) {
        let rule = &mut rules[sub.index];
        let id = rule.id();
        let Some(node_rule) = rule.as_node() else {
            sub.live = false;
            continue;
        };

        let outcome = call_rule(id, Phase::NodeStream, Some(source.path), diag, || {
            node_rule.visit(ancestors, node, source)
        });
        delivered += 1;
        sub.spent += outcome.elapsed;

        if outcome.value.is_none() {
            sub.live = false;
        } else if check_budget(id, Phase::NodeStream, Some(source.path), sub.spent, budget, diag) {
            sub.live = false;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestFacts;
    use crate::rule_core;
    use crate::rules::java::testing::{named_nodes, parse};
    use crate::rules::{Category, NodeRule, RuleCore};
    use crate::scanner::report::Anomaly;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// (kind, start byte, whether `ancestors.last()` was the real parent)
    type Seen = Arc<Mutex<Vec<(String, usize, bool)>>>;

    struct Recorder {
        core: RuleCore,
        seen: Seen,
        accept: bool,
        fail_at: Option<usize>,
    }

    fn recorder(accept: bool, fail_at: Option<usize>) -> (Box<dyn Rule>, Seen) {
        let seen = Seen::default();
        let rule = Recorder {
            core: RuleCore::new("recorder", Category::Generic, "test"),
            seen: seen.clone(),
            accept,
            fail_at,
        };
        (Box::new(rule), seen)
    }

    impl NodeRule for Recorder {
        fn wants(&self, _source: &ParsedSource<'_>) -> anyhow::Result<bool> {
            Ok(self.accept)
        }

        fn visit<'t>(
            &mut self,
            ancestors: &[Node<'t>],
            node: Node<'t>,
            _source: &ParsedSource<'t>,
        ) -> anyhow::Result<()> {
            let mut seen = self.seen.lock().unwrap();
            if Some(seen.len()) == self.fail_at {
                anyhow::bail!("stop");
            }
            let parent_ok = match (ancestors.last(), node.parent()) {
                (Some(parent), Some(actual)) => parent.id() == actual.id(),
                (None, None) => true,
                _ => false,
            };
            seen.push((node.kind().to_string(), node.start_byte(), parent_ok));
            Ok(())
        }
    }

    impl Rule for Recorder {
        rule_core!();

        fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
            Some(self)
        }
    }

    const SOURCE: &str = r#"
class A {
    int x = 1;
    void f(String s) { g(s, "a"); }
    void h() { if (x > 0) { return; } }
}
"#;

    fn run(rules: &mut [Box<dyn Rule>], budget: Option<Duration>) -> (usize, Diagnostics, usize) {
        let tree = parse(SOURCE);
        let facts = ManifestFacts::default();
        let source = ParsedSource {
            path: Path::new("A.java"),
            text: SOURCE,
            tree: &tree,
            facts: &facts,
        };
        let mut diag = Diagnostics::default();
        let deliveries = dispatch_nodes(rules, &source, budget, &mut diag);
        (deliveries, diag, named_nodes(&tree).len())
    }

    #[test]
    fn test_all_subscribers_see_the_same_preorder_sequence() {
        let (first, first_seen) = recorder(true, None);
        let (second, second_seen) = recorder(true, None);
        let mut rules = vec![first, second];

        let (deliveries, diag, total) = run(&mut rules, None);

        let tree = parse(SOURCE);
        let expected: Vec<(String, usize, bool)> = named_nodes(&tree)
            .into_iter()
            .map(|n| (n.kind().to_string(), n.start_byte(), true))
            .collect();
        assert_eq!(*first_seen.lock().unwrap(), expected);
        assert_eq!(*second_seen.lock().unwrap(), expected);
        assert_eq!(deliveries, total * 2);
        assert_eq!(diag.stats.node_deliveries, deliveries);
    }

    #[test]
    fn test_declined_precheck_gets_zero_deliveries() {
        let (rule, seen) = recorder(false, None);
        let mut rules = vec![rule];

        let (deliveries, _, _) = run(&mut rules, None);

        assert_eq!(deliveries, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failing_subscriber_does_not_stop_the_others() {
        let (failing, failing_seen) = recorder(true, Some(3));
        let (healthy, healthy_seen) = recorder(true, None);
        let mut rules = vec![failing, healthy];

        let (_, diag, total) = run(&mut rules, None);

        assert_eq!(failing_seen.lock().unwrap().len(), 3);
        assert_eq!(healthy_seen.lock().unwrap().len(), total);
        assert!(matches!(
            diag.anomalies.as_slice(),
            [Anomaly::RuleFailed { phase: Phase::NodeStream, .. }]
        ));
    }

    #[test]
    fn test_exhausted_budget_drops_subscriber_for_the_file() {
        let (rule, seen) = recorder(true, None);
        let mut rules = vec![rule];

        let (deliveries, diag, _) = run(&mut rules, Some(Duration::ZERO));

        assert_eq!(deliveries, 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(matches!(
            diag.anomalies.as_slice(),
            [Anomaly::RuleTimedOut { phase: Phase::NodeStream, .. }]
        ));
    }
}

//! Dynamically registered broadcast receivers.

use tracing::debug;
use tree_sitter::Node;

use crate::issue::Severity;
use crate::manifest::{DEFAULT_SDK, Manifest};
use crate::rule_core;
use crate::rules::java::{self, MethodCall};
use crate::rules::{Category, ManifestRule, NodeRule, ParsedSource, Rule, RuleCore};

const NAME: &str = "Dynamic broadcast receiver found";
const NOT_EXPORTED_FLAG: &str = "RECEIVER_NOT_EXPORTED";
/// From Android 14 context-registered receivers must declare an export flag.
const EXPORT_FLAG_REQUIRED_SDK: u32 = 34;

pub struct DynamicBroadcastReceiver {
    core: RuleCore,
    target_sdk: u32,
}

impl DynamicBroadcastReceiver {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "dynamic_broadcast_receiver",
                Category::Broadcast,
                "Receivers registered with registerReceiver without permission or export flags",
            ),
            target_sdk: DEFAULT_SDK,
        })
    }

    fn classify(&self, call: &MethodCall<'_, '_>, text: &str) -> (Severity, String) {
        let args: Vec<&str> = call
            .arguments
            .iter()
            .map(|a| java::node_text(*a, text))
            .collect();
        let flags_only = args.get(2).is_some_and(|a| a.contains("RECEIVER_"));
        let permission = call.argument(2).filter(|_| !flags_only);

        match permission {
            None => (
                Severity::Vulnerability,
                "Application registers a broadcast receiver at runtime without requiring a permission. \
                 Any app on the device can send it intents, which may lead to intent spoofing. \
                 Pass a broadcastPermission to registerReceiver or use RECEIVER_NOT_EXPORTED."
                    .to_string(),
            ),
            Some(node) if node.kind() == "null_literal" => (
                Severity::Vulnerability,
                "Application registers a broadcast receiver with a null permission, so any app can \
                 send it intents. Require a signature-level broadcastPermission."
                    .to_string(),
            ),
            Some(node) => {
                let permission = java::node_text(node, text);
                if permission.contains("android.permission.") || permission.contains("BROADCAST") {
                    (
                        Severity::Info,
                        format!(
                            "Broadcast receiver registered with permission {}. Verify that the \
                             permission has an adequate protection level.",
                            permission
                        ),
                    )
                } else {
                    (
                        Severity::Warning,
                        format!(
                            "Broadcast receiver registered with custom permission {}. Make sure it \
                             is declared with android:protectionLevel=\"signature\".",
                            permission
                        ),
                    )
                }
            }
        }
    }
}

impl ManifestRule for DynamicBroadcastReceiver {
    fn check_manifest(&mut self, manifest: &Manifest) -> anyhow::Result<()> {
        self.target_sdk = manifest.facts().target_sdk;
        Ok(())
    }
}

impl NodeRule for DynamicBroadcastReceiver {
    fn wants(&self, source: &ParsedSource<'_>) -> anyhow::Result<bool> {
        Ok(source.text.contains("registerReceiver"))
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
        if call.name != "registerReceiver" {
            return Ok(());
        }
        if call
            .arguments
            .iter()
            .any(|a| source.node_text(*a).contains(NOT_EXPORTED_FLAG))
        {
            debug!(file = %source.path.display(), "Receiver registered as not exported");
            return Ok(());
        }

        let (severity, mut description) = self.classify(&call, source.text);
        let has_flags = call
            .arguments
            .iter()
            .any(|a| source.node_text(*a).contains("RECEIVER_"));
        if self.target_sdk >= EXPORT_FLAG_REQUIRED_SDK && !has_flags {
            description.push_str(
                " Apps targeting Android 14 or higher must pass RECEIVER_EXPORTED or \
                 RECEIVER_NOT_EXPORTED when registering receivers for non-system broadcasts.",
            );
        }

        let issue = self
            .core
            .issue(NAME, severity, description)
            .in_file(source.path)
            .at(source.location(node))
            .with_standard(
                "MSTG-PLATFORM-10",
                "Dynamically registered receivers must be protected against untrusted senders.",
            )
            .with_owasp(&["M1"]);
        self.core.push(issue);
        Ok(())
    }
}

impl Rule for DynamicBroadcastReceiver {
    rule_core!();

    fn as_manifest(&mut self) -> Option<&mut dyn ManifestRule> {
        Some(self)
    }

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
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
class Main extends Activity {
    void wire(BroadcastReceiver r, IntentFilter f) {
        registerReceiver(r, f);
        registerReceiver(r, f, "android.permission.BROADCAST_SMS", null);
        registerReceiver(r, f, "com.example.CUSTOM", null);
        registerReceiver(r, f, Context.RECEIVER_NOT_EXPORTED);
        registerReceiver(r, f, null, null);
    }
}
"#;

    fn scan(rule: &mut Box<dyn Rule>) {
        let tree = parse(SOURCE);
        let facts = ManifestFacts::default();
        let source = ParsedSource {
            path: Path::new("Main.java"),
            text: SOURCE,
            tree: &tree,
            facts: &facts,
        };
        let node_rule = rule.as_node().unwrap();
        assert!(node_rule.wants(&source).unwrap());
        for node in named_nodes(&tree) {
            node_rule.visit(&[], node, &source).unwrap();
        }
    }

    #[test]
    fn test_severity_depends_on_permission() {
        let mut rule = DynamicBroadcastReceiver::boxed();
        scan(&mut rule);
        let severities: Vec<Severity> = rule.issues().iter().map(|i| i.severity()).collect();
        assert_eq!(
            severities,
            vec![
                Severity::Vulnerability,
                Severity::Info,
                Severity::Warning,
                Severity::Vulnerability
            ]
        );
        assert_eq!(rule.issues()[0].location().map(|l| l.start_line()), Some(4));
    }

    #[test]
    fn test_recent_target_sdk_adds_export_flag_note() {
        let mut rule = DynamicBroadcastReceiver::boxed();
        let manifest = Manifest::parse(
            Path::new("AndroidManifest.xml"),
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android">
                <uses-sdk android:minSdkVersion="24" android:targetSdkVersion="34"/>
            </manifest>"#,
        )
        .unwrap();
        rule.as_manifest().unwrap().check_manifest(&manifest).unwrap();
        scan(&mut rule);
        assert!(rule.issues()[0].description().contains("Android 14"));
    }
}

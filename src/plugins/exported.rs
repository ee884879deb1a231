//! Exported components reachable by other apps.
//!
//! The manifest pass records which components are exported and how they are
//! protected. While files stream past, the Java class backing each component is
//! inspected for lifecycle entry points and the intent extras it reads. Issues
//! are emitted in `finalize`, once the exploit payloads are complete.

use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::debug;
use tree_sitter::Node;

use crate::exploit::{self, ComponentKind, ExploitPayload};
use crate::issue::{Location, Severity};
use crate::manifest::{Manifest, ManifestElement};
use crate::rule_core;
use crate::rules::java::{self, MethodCall};
use crate::rules::{Category, ManifestRule, NodeRule, ParsedSource, Rule, RuleCore};

const COMPONENT_TAGS: [&str; 5] = ["activity", "activity-alias", "service", "receiver", "provider"];

const EXTRAS_METHODS: &[&str] = &[
    "getExtras", "getStringExtra", "getIntExtra", "getIntArrayExtra", "getFloatExtra",
    "getFloatArrayExtra", "getDoubleExtra", "getDoubleArrayExtra", "getCharExtra",
    "getCharArrayExtra", "getByteExtra", "getByteArrayExtra", "getBundleExtra",
    "getBooleanExtra", "getBooleanArrayExtra", "getCharSequenceArrayExtra",
    "getCharSequenceArrayListExtra", "getCharSequenceExtra", "getIntegerArrayListExtra",
    "getLongArrayExtra", "getLongExtra", "getParcelableArrayExtra", "getParcelableArrayListExtra",
    "getParcelableExtra", "getSerializableExtra", "getShortArrayExtra", "getShortExtra",
    "getStringArrayExtra", "getStringArrayListExtra", "getString", "getInt", "getData",
    "getDataString", "getAction", "getType", "getScheme",
];

/// Broadcasts only the system may send.
const PROTECTED_BROADCASTS: &[&str] = &[
    "android.intent.action.SCREEN_OFF",
    "android.intent.action.SCREEN_ON",
    "android.intent.action.USER_PRESENT",
    "android.intent.action.TIME_TICK",
    "android.intent.action.TIMEZONE_CHANGED",
    "android.intent.action.BOOT_COMPLETED",
    "android.intent.action.PACKAGE_INSTALL",
    "android.intent.action.PACKAGE_ADDED",
    "android.intent.action.PACKAGE_REPLACED",
    "android.intent.action.MY_PACKAGE_REPLACED",
    "android.intent.action.PACKAGE_REMOVED",
    "android.intent.action.PACKAGE_FULLY_REMOVED",
    "android.intent.action.PACKAGE_CHANGED",
    "android.intent.action.PACKAGE_RESTARTED",
    "android.intent.action.PACKAGE_DATA_CLEARED",
    "android.intent.action.PACKAGE_FIRST_LAUNCH",
    "android.intent.action.BATTERY_CHANGED",
    "android.intent.action.BATTERY_LOW",
    "android.intent.action.BATTERY_OKAY",
    "android.intent.action.ACTION_POWER_CONNECTED",
    "android.intent.action.ACTION_POWER_DISCONNECTED",
    "android.intent.action.ACTION_SHUTDOWN",
    "android.intent.action.DEVICE_STORAGE_LOW",
    "android.intent.action.DEVICE_STORAGE_OK",
    "android.net.conn.CONNECTIVITY_CHANGE",
    "android.net.wifi.WIFI_STATE_CHANGED",
    "android.net.wifi.SCAN_RESULTS",
    "android.bluetooth.adapter.action.STATE_CHANGED",
    "android.intent.action.SIM_STATE_CHANGED",
    "android.intent.action.AIRPLANE_MODE",
];

const UNPROTECTED_NAME: &str = "Exported Components Without Adequate Protection";
const WEAK_PERMISSION_NAME: &str = "Exported Component With Pre-5.0 Permission Vulnerability";
const PROTECTED_BROADCAST_NAME: &str = "Exported Component Receiving Protected Broadcasts";

/// Before Lollipop a permission could be claimed by whichever app was installed first.
const PERMISSION_SAFE_SDK: u32 = 20;
/// Providers without `android:exported` were exported by default up to API 16.
const PROVIDER_EXPORT_DEFAULT_SDK: u32 = 16;

fn entry_methods(kind: ComponentKind) -> &'static [&'static str] {
    match kind {
        ComponentKind::Activity => &["onCreate", "onStart", "onResume", "onNewIntent"],
        ComponentKind::Receiver => &["onReceive"],
        ComponentKind::Service => &["onCreate", "onBind", "onStartCommand", "onHandleIntent"],
        ComponentKind::Provider => &["onCreate", "query", "insert", "update", "delete", "getType"],
    }
}

#[derive(Debug, Clone)]
struct Finding {
    name: &'static str,
    severity: Severity,
    description: String,
    line: usize,
    action_name: Option<String>,
    is_protected_broadcast: bool,
}

#[derive(Debug, Clone)]
struct Component {
    kind: ComponentKind,
    tag: String,
    name: String,
    /// `com/example/Foo`, used to find the backing source file.
    class_path: String,
    has_permission: bool,
    has_intent_filters: bool,
    findings: Vec<Finding>,
    entry_points: Vec<String>,
    arguments: Vec<String>,
}

pub struct ExportedComponents {
    core: RuleCore,
    manifest_path: Option<PathBuf>,
    package: String,
    components: Vec<Component>,
    /// Components backed by the current file; resolved on the first node.
    current: Option<Vec<usize>>,
}

impl ExportedComponents {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "exported_components",
                Category::Manifest,
                "Exported activities, services, receivers and providers without adequate protection",
            ),
            manifest_path: None,
            package: String::new(),
            components: Vec::new(),
            current: None,
        })
    }

    fn analyze(&self, element: &ManifestElement, min_sdk: u32, target_sdk: u32) -> Option<Component> {
        let kind = ComponentKind::from_tag(&element.tag)?;
        let Some(name) = element.attr("android:name") else {
            debug!(tag = %element.tag, "Component without android:name");
            return None;
        };
        let has_intent_filters = element.elements("intent-filter").next().is_some();

        let exported = match element.attr("android:exported") {
            Some(value) => value.trim().eq_ignore_ascii_case("true"),
            None if kind == ComponentKind::Provider => {
                min_sdk <= PROVIDER_EXPORT_DEFAULT_SDK || target_sdk <= PROVIDER_EXPORT_DEFAULT_SDK
            }
            None => has_intent_filters,
        };
        if !exported {
            return None;
        }

        let has_permission = element.has_attr("android:permission");
        let mut component = Component {
            kind,
            tag: element.tag.clone(),
            name: name.to_string(),
            class_path: qualify(name, &self.package).replace('.', "/"),
            has_permission,
            has_intent_filters,
            findings: Vec::new(),
            entry_points: Vec::new(),
            arguments: Vec::new(),
        };

        let weak_permission = has_permission && min_sdk < PERMISSION_SAFE_SDK;
        if has_intent_filters {
            for action in element.elements("action") {
                let Some(action_name) = action.attr("android:name") else {
                    debug!("Intent filter action without android:name");
                    continue;
                };
                let is_protected = PROTECTED_BROADCASTS.contains(&action_name);
                let (issue_name, severity, description) = if is_protected {
                    (PROTECTED_BROADCAST_NAME, Severity::Info, protected_description(&component))
                } else if weak_permission {
                    (WEAK_PERMISSION_NAME, Severity::Info, weak_permission_description(&component))
                } else {
                    (UNPROTECTED_NAME, Severity::Warning, unprotected_description(&component))
                };
                component.findings.push(Finding {
                    name: issue_name,
                    severity,
                    description,
                    line: action.line,
                    action_name: Some(action_name.to_string()),
                    is_protected_broadcast: is_protected,
                });
            }
        } else if weak_permission {
            component.findings.push(Finding {
                name: WEAK_PERMISSION_NAME,
                severity: Severity::Info,
                description: weak_permission_description(&component),
                line: element.line,
                action_name: None,
                is_protected_broadcast: false,
            });
        } else if !has_permission {
            component.findings.push(Finding {
                name: UNPROTECTED_NAME,
                severity: Severity::Warning,
                description: unprotected_description(&component),
                line: element.line,
                action_name: None,
                is_protected_broadcast: false,
            });
        }

        Some(component).filter(|c| !c.findings.is_empty())
    }

    fn components_for(&self, path: &Path) -> Vec<usize> {
        let normalized = path.to_string_lossy().replace('\\', "/");
        let Some(stem) = normalized.strip_suffix(".java") else {
            return Vec::new();
        };
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| stem == c.class_path || stem.ends_with(&format!("/{}", c.class_path)))
            .map(|(i, _)| i)
            .collect()
    }

    fn payload(&self, component: &Component, finding: &Finding) -> ExploitPayload {
        let mut payload = ExploitPayload::new();
        payload.insert(exploit::EXPORTED_ENUM.into(), json!(component.kind.as_str()));
        payload.insert(exploit::TAG_NAME.into(), json!(component.name));
        payload.insert(exploit::PACKAGE_NAME.into(), json!(self.package));
        payload.insert(exploit::COMPONENT_TYPE.into(), json!(component.tag));
        payload.insert(exploit::HAS_PERMISSION.into(), json!(component.has_permission));
        payload.insert(exploit::HAS_INTENT_FILTERS.into(), json!(component.has_intent_filters));
        if let Some(action) = &finding.action_name {
            payload.insert(exploit::ACTION_NAME.into(), json!(action));
        }
        if finding.is_protected_broadcast {
            payload.insert(exploit::IS_PROTECTED_BROADCAST.into(), Value::Bool(true));
        }
        payload.insert(exploit::ARGUMENTS.into(), json!(component.arguments));
        payload.insert(exploit::ENTRY_POINTS.into(), json!(component.entry_points));
        payload
    }
}

fn qualify(name: &str, package: &str) -> String {
    if name.starts_with('.') {
        format!("{}{}", package, name)
    } else if !name.contains('.') {
        format!("{}.{}", package, name)
    } else {
        name.to_string()
    }
}

fn protected_description(c: &Component) -> String {
    format!(
        "Component '{}' ({}) is exported and receives system-protected broadcasts. While these intents \
         can only be sent by system apps, the component may still be vulnerable to second-order injection \
         if it processes untrusted data. Validate all input data even from system sources.",
        c.name, c.tag
    )
}

fn weak_permission_description(c: &Component) -> String {
    format!(
        "Component '{}' ({}) is exported and protected by a permission. On Android < 5.0 permissions can \
         be obtained by malicious apps installed before this one. Review the component for input \
         validation and consider restricting access further.",
        c.name, c.tag
    )
}

fn unprotected_description(c: &Component) -> String {
    format!(
        "Component '{}' ({}) is exported without permission protection, making it accessible by any app \
         on the device. This exposes it to intent injection, data leakage or unauthorized access. Add an \
         android:permission attribute or set android:exported=\"false\" if external access is not required.",
        c.name, c.tag
    )
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

impl ManifestRule for ExportedComponents {
    fn check_manifest(&mut self, manifest: &Manifest) -> anyhow::Result<()> {
        let facts = manifest.facts();
        self.manifest_path = Some(manifest.path().to_path_buf());
        self.package = facts.package.clone();

        let mut components = Vec::new();
        for tag in COMPONENT_TAGS {
            for element in manifest.elements(tag) {
                if let Some(component) = self.analyze(element, facts.min_sdk, facts.target_sdk) {
                    components.push(component);
                }
            }
        }
        debug!(exported = components.len(), "Exported components recorded");
        self.components = components;
        Ok(())
    }
}

impl NodeRule for ExportedComponents {
    fn wants(&self, source: &ParsedSource<'_>) -> anyhow::Result<bool> {
        Ok(!self.components_for(source.path).is_empty())
    }

    fn visit<'t>(
        &mut self,
        _ancestors: &[Node<'t>],
        node: Node<'t>,
        source: &ParsedSource<'t>,
    ) -> anyhow::Result<()> {
        let current = match &self.current {
            Some(current) => current.clone(),
            None => {
                let found = self.components_for(source.path);
                self.current = Some(found.clone());
                found
            }
        };

        match node.kind() {
            "method_declaration" => {
                let Some(name) = node.child_by_field_name("name").map(|n| source.node_text(n)) else {
                    return Ok(());
                };
                for index in current {
                    let component = &mut self.components[index];
                    if entry_methods(component.kind).contains(&name) {
                        push_unique(&mut component.entry_points, name);
                    }
                }
            }
            "method_invocation" => {
                let Some(call) = MethodCall::from_node(node, source.text) else {
                    return Ok(());
                };
                if !EXTRAS_METHODS.contains(&call.name) {
                    return Ok(());
                }
                let keys: Vec<&str> = call
                    .arguments
                    .iter()
                    .filter_map(|arg| java::string_value(*arg, source.text))
                    .filter(|v| !v.is_empty())
                    .collect();
                for index in current {
                    for key in &keys {
                        push_unique(&mut self.components[index].arguments, key);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Rule for ExportedComponents {
    rule_core!();

    fn as_manifest(&mut self) -> Option<&mut dyn ManifestRule> {
        Some(self)
    }

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
        Some(self)
    }

    fn reset(&mut self) {
        self.current = None;
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        let Some(manifest_path) = self.manifest_path.clone() else {
            return Ok(());
        };
        let mut issues = Vec::new();
        for component in &self.components {
            for finding in &component.findings {
                let issue = self
                    .core
                    .issue(finding.name, finding.severity, finding.description.clone())
                    .in_file(&manifest_path)
                    .at(Location::line(finding.line))
                    .with_standard(
                        "MSTG-PLATFORM-5",
                        "Exported components must be protected with permissions or not exported.",
                    )
                    .with_owasp(&["M1"])
                    .with_exploit(self.payload(component, finding));
                issues.push(issue);
            }
        }
        for issue in issues {
            self.core.push(issue);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exploit::ExploitTarget;
    use crate::manifest::ManifestFacts;
    use crate::rules::java::testing::{named_nodes, parse};

    const MANIFEST: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.app">
    <uses-sdk android:minSdkVersion="15" android:targetSdkVersion="28"/>
    <application>
        <activity android:name=".MainActivity">
            <intent-filter>
                <action android:name="com.example.app.OPEN"/>
            </intent-filter>
        </activity>
        <receiver android:name=".BootReceiver" android:exported="true">
            <intent-filter>
                <action android:name="android.intent.action.BOOT_COMPLETED"/>
            </intent-filter>
        </receiver>
        <service android:name="com.example.app.SyncService" android:exported="true"
            android:permission="com.example.SYNC"/>
        <provider android:name=".DataProvider" android:authorities="com.example.data"/>
        <activity android:name=".Hidden" android:exported="false"/>
    </application>
</manifest>"#;

    const MAIN_ACTIVITY: &str = r#"
package com.example.app;
class MainActivity extends Activity {
    protected void onCreate(Bundle b) {
        String token = getIntent().getStringExtra("token");
    }
    void helper() {}
}
"#;

    fn analyzed() -> Box<dyn Rule> {
        let manifest = Manifest::parse(Path::new("AndroidManifest.xml"), MANIFEST).unwrap();
        let mut rule = ExportedComponents::boxed();
        rule.as_manifest().unwrap().check_manifest(&manifest).unwrap();
        rule
    }

    #[test]
    fn test_findings_follow_protection_level() {
        let mut rule = analyzed();
        rule.finalize().unwrap();
        let found: Vec<(&str, Severity)> = rule.issues().iter().map(|i| (i.name(), i.severity())).collect();
        assert_eq!(
            found,
            vec![
                (UNPROTECTED_NAME, Severity::Warning),
                (WEAK_PERMISSION_NAME, Severity::Info),
                (PROTECTED_BROADCAST_NAME, Severity::Info),
                (UNPROTECTED_NAME, Severity::Warning),
            ]
        );
    }

    #[test]
    fn test_source_file_enriches_payload() {
        let mut rule = analyzed();
        let tree = parse(MAIN_ACTIVITY);
        let facts = ManifestFacts::default();
        let source = ParsedSource {
            path: Path::new("app/src/main/java/com/example/app/MainActivity.java"),
            text: MAIN_ACTIVITY,
            tree: &tree,
            facts: &facts,
        };
        let node_rule = rule.as_node().unwrap();
        assert!(node_rule.wants(&source).unwrap());
        for node in named_nodes(&tree) {
            node_rule.visit(&[], node, &source).unwrap();
        }
        rule.reset();
        rule.finalize().unwrap();

        let target = ExploitTarget::from_payload(rule.issues()[0].exploit().unwrap()).unwrap();
        assert_eq!(target.kind, ComponentKind::Activity);
        assert_eq!(target.qualified_name(), "com.example.app.MainActivity");
        assert_eq!(target.entry_points, vec!["onCreate"]);
        assert_eq!(target.arguments, vec!["token"]);
        assert_eq!(target.action_name.as_deref(), Some("com.example.app.OPEN"));
    }

    #[test]
    fn test_unrelated_file_is_declined() {
        let mut rule = analyzed();
        let tree = parse("class Other {}");
        let facts = ManifestFacts::default();
        let source = ParsedSource {
            path: Path::new("src/com/example/app/Other.java"),
            text: "class Other {}",
            tree: &tree,
            facts: &facts,
        };
        assert!(!rule.as_node().unwrap().wants(&source).unwrap());
    }
}

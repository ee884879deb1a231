//! Application-level manifest checks.

use tracing::debug;

use crate::issue::{Location, Severity};
use crate::manifest::Manifest;
use crate::rule_core;
use crate::rules::{Category, ManifestRule, Rule, RuleCore};

const DEBUGGABLE_DESCRIPTION: &str = "The android:debuggable flag is manually set to 'true' in the AndroidManifest.xml. \
This makes the application debuggable in production builds, exposing it to data leakage and runtime code inspection. \
Remove the attribute and let the build tools set it. \
Reference: https://developer.android.com/guide/topics/manifest/application-element#debug";

const ALLOW_BACKUP_DESCRIPTION: &str = "Backups are enabled (android:allowBackup=\"true\"). Application data can be \
backed up via adb, which may leak sensitive data if USB debugging is enabled on a device. \
Set android:allowBackup=\"false\" unless explicitly required. \
Reference: https://developer.android.com/reference/android/R.attr#allowBackup";

const TAP_JACKING_MIN_SDK: u32 = 9;

/// Flags `<application>` elements where a boolean attribute is `true`.
struct ApplicationFlag {
    core: RuleCore,
    attribute: &'static str,
    issue_name: &'static str,
    issue_description: &'static str,
    standard: (&'static str, &'static str),
    owasp: &'static [&'static str],
}

impl ManifestRule for ApplicationFlag {
    fn check_manifest(&mut self, manifest: &Manifest) -> anyhow::Result<()> {
        for application in manifest.elements("application") {
            let Some(value) = application.attr(self.attribute) else {
                debug!(attribute = self.attribute, "Attribute not set on <application>");
                continue;
            };
            debug!(attribute = self.attribute, value, "Found application attribute");
            if !application.attr_is_true(self.attribute) {
                continue;
            }
            let issue = self
                .core
                .issue(self.issue_name, Severity::Vulnerability, self.issue_description)
                .in_file(manifest.path())
                .at(Location::line(application.line))
                .with_standard(self.standard.0, self.standard.1)
                .with_owasp(self.owasp);
            self.core.push(issue);
        }
        Ok(())
    }
}

impl Rule for ApplicationFlag {
    rule_core!();

    fn as_manifest(&mut self) -> Option<&mut dyn ManifestRule> {
        Some(self)
    }
}

pub fn debuggable() -> Box<dyn Rule> {
    Box::new(ApplicationFlag {
        core: RuleCore::new(
            "debuggable",
            Category::Manifest,
            "android:debuggable enabled on the application",
        ),
        attribute: "android:debuggable",
        issue_name: "Manifest sets android:debuggable=\"true\"",
        issue_description: DEBUGGABLE_DESCRIPTION,
        standard: (
            "MSTG-PLATFORM-7",
            "android:debuggable must be false in production builds.",
        ),
        owasp: &["M10"],
    })
}

pub fn allow_backup() -> Box<dyn Rule> {
    Box::new(ApplicationFlag {
        core: RuleCore::new(
            "allow_backup",
            Category::Manifest,
            "android:allowBackup enabled on the application",
        ),
        attribute: "android:allowBackup",
        issue_name: "android:allowBackup enabled in manifest",
        issue_description: ALLOW_BACKUP_DESCRIPTION,
        standard: (
            "MSTG-STORAGE-1",
            "Do not allow backups unless required and secured.",
        ),
        owasp: &["M2"],
    })
}

struct MinSdk {
    core: RuleCore,
}

impl ManifestRule for MinSdk {
    fn check_manifest(&mut self, manifest: &Manifest) -> anyhow::Result<()> {
        let min_sdk = manifest.facts().min_sdk;
        debug!(min_sdk, "Checking minSdkVersion");
        if min_sdk >= TAP_JACKING_MIN_SDK {
            return Ok(());
        }

        let mut issue = self
            .core
            .issue(
                "TapJacking possible (minSdkVersion < 9)",
                Severity::Vulnerability,
                format!(
                    "MinSdkVersion is set to {}, which is less than 9. This may leave the application \
                     vulnerable to TapJacking attacks. Set minSdkVersion >= 9 or implement custom protections.",
                    min_sdk
                ),
            )
            .in_file(manifest.path())
            .with_standard(
                "MSTG-PLATFORM-1",
                "Apps should not set minSdkVersion below 9 due to known vulnerabilities like TapJacking.",
            )
            .with_owasp(&["M1"]);
        if let Some(uses_sdk) = manifest.elements("uses-sdk").next() {
            issue = issue.at(Location::line(uses_sdk.line));
        }
        self.core.push(issue);
        Ok(())
    }
}

impl Rule for MinSdk {
    rule_core!();

    fn as_manifest(&mut self) -> Option<&mut dyn ManifestRule> {
        Some(self)
    }
}

pub fn min_sdk() -> Box<dyn Rule> {
    Box::new(MinSdk {
        core: RuleCore::new(
            "min_sdk",
            Category::Manifest,
            "minSdkVersion low enough to allow TapJacking",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn run(rule: &mut Box<dyn Rule>, xml: &str) {
        let manifest = Manifest::parse(Path::new("AndroidManifest.xml"), xml).unwrap();
        rule.as_manifest().unwrap().check_manifest(&manifest).unwrap();
    }

    const MANIFEST: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example">
    <uses-sdk android:minSdkVersion="8"/>
    <application android:debuggable="True" android:allowBackup="false"/>
</manifest>"#;

    #[test]
    fn test_debuggable_true_is_reported_with_line() {
        let mut rule = debuggable();
        run(&mut rule, MANIFEST);
        let issues = rule.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity(), Severity::Vulnerability);
        assert_eq!(issues[0].location(), Some(Location::line(3)));
        assert_eq!(issues[0].standard_id(), Some("MSTG-PLATFORM-7"));
    }

    #[test]
    fn test_allow_backup_false_is_quiet() {
        let mut rule = allow_backup();
        run(&mut rule, MANIFEST);
        assert!(rule.issues().is_empty());
    }

    #[test]
    fn test_min_sdk_below_nine_flags_tapjacking() {
        let mut rule = min_sdk();
        run(&mut rule, MANIFEST);
        assert_eq!(rule.issues().len(), 1);
        assert!(rule.issues()[0].description().contains("set to 8"));

        let mut rule = min_sdk();
        run(
            &mut rule,
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android">
                <uses-sdk android:minSdkVersion="21"/>
            </manifest>"#,
        );
        assert!(rule.issues().is_empty());
    }
}

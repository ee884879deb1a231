//! Application manifest model.
//!
//! The manifest is parsed once per scan into an owned element tree. The derived
//! facts (SDK levels, package) always resolve: when the manifest is missing or
//! unparsable they fall back to permissive defaults so per-file rules can still run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::scanner::lifecycle::decode;

pub const MANIFEST_FILE_NAME: &str = "AndroidManifest.xml";
pub const PACKAGE_NOT_FOUND: &str = "PACKAGE_NOT_FOUND";
pub const DEFAULT_SDK: u32 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed manifest XML: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// Scalar facts derived from the manifest, shared read-only by every rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestFacts {
    pub min_sdk: u32,
    pub target_sdk: u32,
    pub package: String,
}

impl Default for ManifestFacts {
    fn default() -> Self {
        Self {
            min_sdk: DEFAULT_SDK,
            target_sdk: DEFAULT_SDK,
            package: PACKAGE_NOT_FOUND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestElement {
    pub tag: String,
    /// Attributes keyed by qualified name, e.g. `android:exported`.
    pub attributes: BTreeMap<String, String>,
    pub line: usize,
    pub children: Vec<ManifestElement>,
}

impl ManifestElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Attribute value compared case-insensitively against `true`.
    pub fn attr_is_true(&self, name: &str) -> bool {
        self.attr(name)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Pre-order iterator over every element below this one (self excluded).
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    pub fn elements<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a ManifestElement> + 'a {
        self.descendants().filter(move |e| e.tag == tag)
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a ManifestElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a ManifestElement;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        self.stack.extend(element.children.iter().rev());
        Some(element)
    }
}

#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    root: ManifestElement,
    facts: ManifestFacts,
}

impl Manifest {
    pub fn parse(path: &Path, text: &str) -> Result<Self, ManifestError> {
        let doc = roxmltree::Document::parse(text)?;
        let root = convert(doc.root_element(), &doc);
        let facts = derive_facts(&root);
        debug!(
            manifest = %path.display(),
            min_sdk = facts.min_sdk,
            target_sdk = facts.target_sdk,
            package = %facts.package,
            "Parsed manifest"
        );
        Ok(Self {
            path: path.to_path_buf(),
            root,
            facts,
        })
    }

    /// Reads with the same UTF-8 then ISO-8859-1 fallback used for sources.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = decode(fs::read(path)?);
        Self::parse(path, &text)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn facts(&self) -> &ManifestFacts {
        &self.facts
    }

    /// All elements with the given tag, root included.
    pub fn elements<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a ManifestElement> + 'a {
        std::iter::once(&self.root)
            .filter(move |e| e.tag == tag)
            .chain(self.root.elements(tag))
    }
}

fn convert(node: roxmltree::Node<'_, '_>, doc: &roxmltree::Document<'_>) -> ManifestElement {
    let attributes = node
        .attributes()
        .map(|attr| {
            let key = match attr.namespace().and_then(|ns| node.lookup_prefix(ns)) {
                Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, attr.name()),
                _ => attr.name().to_string(),
            };
            (key, attr.value().to_string())
        })
        .collect();

    ManifestElement {
        tag: node.tag_name().name().to_string(),
        attributes,
        line: doc.text_pos_at(node.range().start).row as usize,
        children: node
            .children()
            .filter(|child| child.is_element())
            .map(|child| convert(child, doc))
            .collect(),
    }
}

fn derive_facts(root: &ManifestElement) -> ManifestFacts {
    let uses_sdk = std::iter::once(root)
        .chain(root.descendants())
        .find(|e| e.tag == "uses-sdk");
    let sdk = |attr: &str| {
        uses_sdk
            .and_then(|e| e.attr(attr))
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_SDK)
    };

    ManifestFacts {
        min_sdk: sdk("android:minSdkVersion"),
        target_sdk: sdk("android:targetSdkVersion"),
        package: root
            .attr("package")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(PACKAGE_NOT_FOUND)
            .to_string(),
    }
}

/// Outcome of loading the manifest for one scan.
#[derive(Debug)]
pub enum ManifestStatus {
    Parsed(Manifest),
    Unparsable { path: PathBuf, reason: String },
    Missing,
}

impl ManifestStatus {
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            warn!("No manifest found, SDK-gated rules use permissive defaults");
            return ManifestStatus::Missing;
        };

        match Manifest::load(path) {
            Ok(manifest) => ManifestStatus::Parsed(manifest),
            Err(ManifestError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(manifest = %path.display(), "Manifest does not exist");
                ManifestStatus::Missing
            }
            Err(e) => {
                warn!(manifest = %path.display(), error = %e, "Manifest could not be parsed, using defaults");
                ManifestStatus::Unparsable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        match self {
            ManifestStatus::Parsed(manifest) => Some(manifest),
            _ => None,
        }
    }

    pub fn facts(&self) -> ManifestFacts {
        self.manifest()
            .map(|m| m.facts().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="com.example.app">
    <uses-sdk android:minSdkVersion="19" android:targetSdkVersion="30"/>
    <application android:allowBackup="true" android:debuggable="TRUE">
        <activity android:name=".MainActivity" android:exported="true"/>
        <receiver android:name=".SyncReceiver">
            <intent-filter>
                <action android:name="com.example.SYNC"/>
            </intent-filter>
        </receiver>
    </application>
</manifest>
"#;

    #[test]
    fn test_parse_derives_facts() {
        let manifest = Manifest::parse(Path::new("AndroidManifest.xml"), SAMPLE).unwrap();
        assert_eq!(
            manifest.facts(),
            &ManifestFacts {
                min_sdk: 19,
                target_sdk: 30,
                package: "com.example.app".to_string(),
            }
        );
    }

    #[test]
    fn test_attributes_keep_android_prefix_and_lines() {
        let manifest = Manifest::parse(Path::new("AndroidManifest.xml"), SAMPLE).unwrap();
        let app = manifest.elements("application").next().unwrap();
        assert!(app.attr_is_true("android:debuggable"));
        assert_eq!(app.line, 5);
        let actions: Vec<_> = manifest
            .elements("action")
            .filter_map(|a| a.attr("android:name"))
            .collect();
        assert_eq!(actions, vec!["com.example.SYNC"]);
    }

    #[test]
    fn test_missing_sdk_and_package_fall_back() {
        let xml = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android">
            <uses-sdk android:minSdkVersion="abc"/>
        </manifest>"#;
        let manifest = Manifest::parse(Path::new("m.xml"), xml).unwrap();
        assert_eq!(manifest.facts(), &ManifestFacts::default());
    }

    #[test]
    fn test_unparsable_manifest_resolves_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        fs::write(&path, "<manifest package=\"x\"><application></manifest").unwrap();

        let status = ManifestStatus::load(Some(&path));
        assert!(matches!(status, ManifestStatus::Unparsable { .. }));
        let facts = status.facts();
        assert_eq!(facts.min_sdk, 1);
        assert_eq!(facts.target_sdk, 1);
        assert_eq!(facts.package, PACKAGE_NOT_FOUND);
    }

    #[test]
    fn test_nonexistent_manifest_is_missing() {
        let dir = TempDir::new().unwrap();
        let status = ManifestStatus::load(Some(&dir.path().join("nope.xml")));
        assert!(matches!(status, ManifestStatus::Missing));
        assert!(status.manifest().is_none());
    }

    #[test]
    fn test_latin1_manifest_is_decoded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        let mut bytes = br#"<?xml version="1.0"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.caf"#
            .to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(
            br#"">
    <uses-sdk android:minSdkVersion="21" android:targetSdkVersion="33"/>
</manifest>"#,
        );
        fs::write(&path, bytes).unwrap();

        let status = ManifestStatus::load(Some(&path));
        let manifest = status.manifest().expect("latin-1 manifest should parse");
        assert_eq!(manifest.facts().package, "com.caf\u{e9}");
        assert_eq!(manifest.facts().min_sdk, 21);
        assert_eq!(manifest.facts().target_sdk, 33);
    }
}

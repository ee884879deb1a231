//! Structured exploit payloads attached to issues.
//!
//! Payloads are free-form key/value maps so rules can attach whatever context they
//! have. A packaging step that builds proof-of-concept artifacts only understands the
//! keys listed here, and reads them through [`ExploitTarget::from_payload`].

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::issue::Issue;

pub type ExploitPayload = BTreeMap<String, Value>;

pub const EXPORTED_ENUM: &str = "exported_enum";
pub const TAG_NAME: &str = "tag_name";
pub const PACKAGE_NAME: &str = "package_name";
pub const COMPONENT_TYPE: &str = "component_type";
pub const HAS_PERMISSION: &str = "has_permission";
pub const HAS_INTENT_FILTERS: &str = "has_intent_filters";
pub const ACTION_NAME: &str = "action_name";
pub const IS_PROTECTED_BROADCAST: &str = "is_protected_broadcast";
pub const ARGUMENTS: &str = "arguments";
pub const ENTRY_POINTS: &str = "entry_points";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Activity,
    Service,
    Receiver,
    Provider,
}

impl ComponentKind {
    /// Maps a manifest tag to its component kind. `activity-alias` is an activity.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "activity" | "activity-alias" => Some(ComponentKind::Activity),
            "service" => Some(ComponentKind::Service),
            "receiver" => Some(ComponentKind::Receiver),
            "provider" => Some(ComponentKind::Provider),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Activity => "activity",
            ComponentKind::Service => "service",
            ComponentKind::Receiver => "receiver",
            ComponentKind::Provider => "provider",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ComponentKind::Activity => "Activity",
            ComponentKind::Service => "Service",
            ComponentKind::Receiver => "Broadcast Receiver",
            ComponentKind::Provider => "Content Provider",
        }
    }
}

/// Typed view over the recognised payload keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExploitTarget {
    pub kind: ComponentKind,
    pub tag_name: String,
    pub package_name: String,
    pub has_permission: bool,
    pub has_intent_filters: bool,
    pub action_name: Option<String>,
    pub is_protected_broadcast: bool,
    pub arguments: Vec<String>,
    pub entry_points: Vec<String>,
}

impl ExploitTarget {
    /// Validates a payload. Returns `None` when a required key is missing or mistyped.
    pub fn from_payload(payload: &ExploitPayload) -> Option<Self> {
        let kind = payload
            .get(EXPORTED_ENUM)
            .and_then(Value::as_str)
            .and_then(ComponentKind::from_tag)?;
        let tag_name = payload.get(TAG_NAME)?.as_str()?.to_string();
        let package_name = payload.get(PACKAGE_NAME)?.as_str()?.to_string();

        Some(Self {
            kind,
            tag_name,
            package_name,
            has_permission: optional_bool(payload, HAS_PERMISSION)?,
            has_intent_filters: optional_bool(payload, HAS_INTENT_FILTERS)?,
            action_name: match payload.get(ACTION_NAME) {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_str()?.to_string()),
            },
            is_protected_broadcast: optional_bool(payload, IS_PROTECTED_BROADCAST)?,
            arguments: string_list(payload, ARGUMENTS)?,
            entry_points: string_list(payload, ENTRY_POINTS)?,
        })
    }

    /// Fully qualified component name, resolving a leading `.` against the package.
    pub fn qualified_name(&self) -> String {
        if self.tag_name.starts_with('.') {
            format!("{}{}", self.package_name, self.tag_name)
        } else {
            self.tag_name.clone()
        }
    }
}

fn optional_bool(payload: &ExploitPayload, key: &str) -> Option<bool> {
    match payload.get(key) {
        None | Some(Value::Null) => Some(false),
        Some(value) => value.as_bool(),
    }
}

fn string_list(payload: &ExploitPayload, key: &str) -> Option<Vec<String>> {
    match payload.get(key) {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(_) => None,
    }
}

/// Extracts every valid exploit target from a set of issues.
pub fn exploit_targets<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Vec<ExploitTarget> {
    issues
        .into_iter()
        .filter_map(|issue| {
            let payload = issue.exploit()?;
            let target = ExploitTarget::from_payload(payload);
            if target.is_none() {
                debug!(issue = issue.name(), "Exploit payload lacks required keys, skipping");
            }
            target
        })
        .collect()
}

use std::collections::HashSet;
use tracing::{debug, info};

use super::{Capability, Category, Rule};
use crate::error::ScanError;

/// Module names that hold shared helpers and must never be registered as rules.
pub const DENYLIST: &[&str] = &["helpers", "manifest_helpers"];

pub type RuleFactory = fn() -> Box<dyn Rule>;

#[derive(Clone, Copy)]
pub struct RuleEntry {
    pub id: &'static str,
    pub category: Category,
    pub factory: RuleFactory,
}

impl RuleEntry {
    pub fn new(id: &'static str, category: Category, factory: RuleFactory) -> Self {
        Self { id, category, factory }
    }

    pub fn instantiate(&self) -> Box<dyn Rule> {
        (self.factory)()
    }
}

impl std::fmt::Debug for RuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEntry")
            .field("id", &self.id)
            .field("category", &self.category)
            .finish()
    }
}

/// Which registered rules a scan should run.
#[derive(Debug, Clone, Default)]
pub struct RuleSelection {
    pub disabled: Vec<String>,
    /// Empty means every category.
    pub categories: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RuleInfo {
    pub id: &'static str,
    pub category: Category,
    pub description: &'static str,
    pub capabilities: Vec<Capability>,
    pub enabled: bool,
}

#[derive(Debug, Default)]
pub struct RuleRegistry {
    entries: Vec<RuleEntry>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Result<Self, ScanError> {
        let mut registry = Self::new();
        crate::plugins::register_builtin(&mut registry)?;
        debug!(rules = registry.len(), "Built-in rules registered");
        Ok(registry)
    }

    pub fn register(&mut self, entry: RuleEntry) -> Result<(), ScanError> {
        if DENYLIST.contains(&entry.id) {
            return Err(ScanError::DenylistedRule(entry.id.to_string()));
        }
        if self.entries.iter().any(|e| e.id == entry.id) {
            return Err(ScanError::DuplicateRule(entry.id.to_string()));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries grouped by category load order; registration order within a category.
    pub fn entries(&self) -> Vec<&RuleEntry> {
        let mut ordered: Vec<&RuleEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.category);
        ordered
    }

    pub fn select(&self, selection: &RuleSelection) -> Result<Vec<&RuleEntry>, ScanError> {
        for id in &selection.disabled {
            if !self.entries.iter().any(|e| e.id == id) {
                return Err(ScanError::UnknownRule(id.clone()));
            }
        }
        let categories = selection
            .categories
            .iter()
            .map(|c| c.parse::<Category>())
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(self
            .entries()
            .into_iter()
            .filter(|e| !selection.disabled.iter().any(|d| d == e.id))
            .filter(|e| categories.is_empty() || categories.contains(&e.category))
            .collect())
    }

    /// Fresh rule instances for one scan. An empty result is fatal.
    pub fn instantiate(&self, selection: &RuleSelection) -> Result<Vec<Box<dyn Rule>>, ScanError> {
        if self.entries.is_empty() {
            return Err(ScanError::NoRules("registry is empty".to_string()));
        }
        let selected = self.select(selection)?;
        if selected.is_empty() {
            return Err(ScanError::NoRules(
                "every registered rule is disabled by the current selection".to_string(),
            ));
        }
        info!(rules = selected.len(), "Loading rules");
        Ok(selected.into_iter().map(RuleEntry::instantiate).collect())
    }

    pub fn describe(&self, selection: &RuleSelection) -> Result<Vec<RuleInfo>, ScanError> {
        let enabled: HashSet<&str> = self.select(selection)?.into_iter().map(|e| e.id).collect();
        Ok(self
            .entries()
            .into_iter()
            .map(|entry| {
                let mut rule = entry.instantiate();
                RuleInfo {
                    id: entry.id,
                    category: entry.category,
                    description: rule.description(),
                    capabilities: rule.capabilities(),
                    enabled: enabled.contains(entry.id),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_core;
    use crate::rules::RuleCore;

    struct Noop {
        core: RuleCore,
    }

    impl Rule for Noop {
        rule_core!();
    }

    fn noop_manifest() -> Box<dyn Rule> {
        Box::new(Noop {
            core: RuleCore::new("noop_manifest", Category::Manifest, "noop"),
        })
    }

    fn noop_generic() -> Box<dyn Rule> {
        Box::new(Noop {
            core: RuleCore::new("noop_generic", Category::Generic, "noop"),
        })
    }

    fn small_registry() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        registry
            .register(RuleEntry::new("noop_generic", Category::Generic, noop_generic))
            .unwrap();
        registry
            .register(RuleEntry::new("noop_manifest", Category::Manifest, noop_manifest))
            .unwrap();
        registry
    }

    #[test]
    fn test_denylisted_and_duplicate_ids_are_rejected() {
        let mut registry = small_registry();
        let err = registry
            .register(RuleEntry::new("helpers", Category::File, noop_generic))
            .unwrap_err();
        assert!(matches!(err, ScanError::DenylistedRule(_)));
        let err = registry
            .register(RuleEntry::new("noop_generic", Category::Generic, noop_generic))
            .unwrap_err();
        assert!(matches!(err, ScanError::DuplicateRule(_)));
    }

    #[test]
    fn test_entries_follow_category_load_order() {
        let registry = small_registry();
        let ids: Vec<_> = registry.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["noop_manifest", "noop_generic"]);
    }

    #[test]
    fn test_selection_filters_and_validates() {
        let registry = small_registry();
        let selection = RuleSelection {
            disabled: vec!["noop_manifest".to_string()],
            categories: vec![],
        };
        let ids: Vec<_> = registry.select(&selection).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["noop_generic"]);

        let unknown = RuleSelection {
            disabled: vec!["nope".to_string()],
            categories: vec![],
        };
        assert!(matches!(registry.select(&unknown), Err(ScanError::UnknownRule(_))));
    }

    #[test]
    fn test_empty_selection_is_fatal() {
        let registry = small_registry();
        let selection = RuleSelection {
            disabled: vec![],
            categories: vec!["crypto".to_string()],
        };
        assert!(matches!(
            registry.instantiate(&selection),
            Err(ScanError::NoRules(_))
        ));
        assert!(matches!(
            RuleRegistry::new().instantiate(&RuleSelection::default()),
            Err(ScanError::NoRules(_))
        ));
    }

    #[test]
    fn test_builtin_registry_loads() {
        let registry = RuleRegistry::with_builtin().unwrap();
        let entries = registry.entries();
        assert_eq!(entries.first().map(|e| e.category), Some(Category::Manifest));
        assert!(registry.len() >= 15);
        let info = registry.describe(&RuleSelection::default()).unwrap();
        assert!(info.iter().all(|r| r.enabled && !r.capabilities.is_empty()));
    }
}

use colored::Colorize;
use std::path::Path;

use crate::config::DroidscanConfig;
use crate::rules::{RuleRegistry, RuleSelection};

pub fn handle_rules_command(project_root: &Path, explicit_config: Option<&Path>) -> anyhow::Result<()> {
    let config = DroidscanConfig::resolve(explicit_config, project_root)?;
    let registry = RuleRegistry::with_builtin()?;
    let selection = RuleSelection {
        disabled: config.scan.disabled_rules.clone(),
        categories: config.scan.categories.clone(),
    };

    println!("\n{}", "Rules:".bold());
    for rule in registry.describe(&selection)? {
        let status = if rule.enabled { "[ON] ".green() } else { "[OFF]".dimmed() };
        let capabilities: Vec<&str> = rule.capabilities.iter().map(|c| c.label()).collect();
        println!(
            "  {} {:<28} {:<12} {}  {}",
            status,
            rule.id.yellow(),
            format!("[{}]", rule.category),
            rule.description,
            capabilities.join("+").dimmed()
        );
    }

    println!();
    if DroidscanConfig::find_config_dir(project_root).is_none() && explicit_config.is_none() {
        println!("   Info: no .droidscan.toml found, using defaults.");
    }
    println!("   Disable rules or restrict categories in .droidscan.toml:");
    println!("   [scan]");
    println!("   disabled_rules = {:?}", config.scan.disabled_rules);
    println!("   categories = {:?}", config.scan.categories);
    Ok(())
}

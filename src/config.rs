use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ScanError;

pub const CONFIG_FILE_NAME: &str = ".droidscan.toml";

pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &["build", ".gradle", ".idea", ".git", "node_modules"];

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DroidscanConfig {
    pub scan: ScanSection,
    pub report: ReportSection,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScanSection {
    /// Rule ids that never run.
    pub disabled_rules: Vec<String>,
    /// When non-empty, only rules in these categories run.
    pub categories: Vec<String>,
    /// Directory or file names excluded from the work set wherever they appear.
    pub ignore_patterns: Vec<String>,
    /// Let the project's `.gitignore`/`.ignore` files hide paths from the scan.
    pub respect_ignore_files: bool,
    pub rule_budget_ms: Option<u64>,
    /// Relative paths are taken from the directory holding the config file.
    pub manifest: Option<PathBuf>,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            disabled_rules: Vec::new(),
            categories: Vec::new(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            respect_ignore_files: false,
            rule_budget_ms: None,
            manifest: None,
        }
    }
}

impl ScanSection {
    pub fn rule_budget(&self) -> Option<Duration> {
        self.rule_budget_ms.map(Duration::from_millis)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Sarif,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ReportSection {
    pub format: ReportFormat,
    pub output: Option<PathBuf>,
}

impl DroidscanConfig {
    pub fn parse(content: &str) -> Result<Self, ScanError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads `.droidscan.toml` from `dir`. A missing file is not an error.
    pub fn load(dir: &Path) -> Result<Option<Self>, ScanError> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.is_file() {
            return Ok(None);
        }
        Self::load_file(&config_path).map(Some)
    }

    pub fn load_file(path: &Path) -> Result<Self, ScanError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::parse(&content)?;
        if let Some(dir) = path.parent() {
            config.anchor_paths(dir);
        }
        debug!(config = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Walks up from `start` looking for the nearest directory with a config file.
    pub fn find_config_dir(start: &Path) -> Option<PathBuf> {
        let start = if start.is_file() { start.parent()? } else { start };
        start
            .ancestors()
            .find(|dir| dir.join(CONFIG_FILE_NAME).is_file())
            .map(Path::to_path_buf)
    }

    /// Explicit path first, then the nearest config above `source`, then defaults.
    pub fn resolve(explicit: Option<&Path>, source: &Path) -> Result<Self, ScanError> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }
        match Self::find_config_dir(source) {
            Some(dir) => Ok(Self::load(&dir)?.unwrap_or_default()),
            None => Ok(Self::default()),
        }
    }

    fn anchor_paths(&mut self, config_dir: &Path) {
        if let Some(manifest) = self.scan.manifest.as_mut() {
            if manifest.is_relative() {
                *manifest = config_dir.join(&*manifest);
            }
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole scan.
///
/// Unreadable files, parse failures, manifest problems and failing rules are not
/// errors at this level; they are recovered locally and surface as anomalies.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Source path does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("No rules available for this scan: {0}")]
    NoRules(String),

    #[error("Rule '{0}' is a helper module, not a rule")]
    DenylistedRule(String),

    #[error("Rule '{0}' is registered twice")]
    DuplicateRule(String),

    #[error("Unknown rule '{0}'")]
    UnknownRule(String),

    #[error("Unknown rule category '{0}'")]
    UnknownCategory(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

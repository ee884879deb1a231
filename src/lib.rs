//! # droidscan
//!
//! Rule-based static analysis for Android application sources. A scan reads
//! the `AndroidManifest.xml` once, then walks every file of the project and
//! hands it to the registered rules, which each look at it through one or
//! more capabilities: raw text, a parsed Java tree, a shared node stream or
//! the manifest itself.

pub mod commands;
pub mod config;
pub mod error;
pub mod exploit;
pub mod issue;
pub mod manifest;
pub mod plugins;
pub mod rules;
pub mod scanner;

pub use error::ScanError;
pub use issue::{Issue, IssueSet, Location, Severity};
pub use scanner::{ScanReport, ScanRequest, Scanner};

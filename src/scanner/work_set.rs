use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::report::Anomaly;
use crate::error::ScanError;
use crate::manifest::MANIFEST_FILE_NAME;

/// How the project tree is walked.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Directory or file names excluded wherever they appear in a path.
    pub ignore_patterns: Vec<String>,
    /// Honour `.gitignore`, `.ignore` and git excludes found in the project.
    pub respect_ignore_files: bool,
}

/// Files to scan in one invocation, gathered once and kept sorted so reports are reproducible.
#[derive(Debug, Clone, Default)]
pub struct WorkSet {
    files: BTreeSet<PathBuf>,
    errors: Vec<Anomaly>,
}

impl WorkSet {
    /// A directory is walked recursively; a single file becomes a one-element set.
    pub fn gather(source: &Path, options: &WalkOptions) -> Result<Self, ScanError> {
        if !source.exists() {
            return Err(ScanError::SourceNotFound(source.to_path_buf()));
        }
        if source.is_file() {
            return Ok(Self {
                files: BTreeSet::from([source.to_path_buf()]),
                errors: Vec::new(),
            });
        }

        let vcs = options.respect_ignore_files;
        let walker = WalkBuilder::new(source)
            .hidden(false)
            .parents(vcs)
            .ignore(vcs)
            .git_ignore(vcs)
            .git_exclude(vcs)
            .git_global(vcs)
            .require_git(false)
            .build();

        let mut files = BTreeSet::new();
        let mut errors = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Cannot walk part of the project");
                    errors.push(walk_anomaly(&e));
                    continue;
                }
            };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(source).unwrap_or(path);
            if is_ignored(relative, &options.ignore_patterns) {
                debug!(file = %relative.display(), "Excluded by ignore pattern");
                continue;
            }
            files.insert(path.to_path_buf());
        }

        info!(
            root = %source.display(),
            files = files.len(),
            walk_errors = errors.len(),
            "Work set gathered"
        );
        Ok(Self { files, errors })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    /// Parts of the tree that could not be walked.
    pub fn errors(&self) -> &[Anomaly] {
        &self.errors
    }

    /// The manifest closest to the root, matched case-insensitively by file name.
    pub fn find_manifest(&self) -> Option<&Path> {
        let found = self
            .iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.eq_ignore_ascii_case(MANIFEST_FILE_NAME))
                    .unwrap_or(false)
            })
            .min_by_key(|p| (p.components().count(), p.to_path_buf()));
        if let Some(path) = found {
            debug!(manifest = %path.display(), "Manifest located in work set");
        }
        found
    }
}

fn walk_anomaly(err: &ignore::Error) -> Anomaly {
    Anomaly::WalkFailed {
        path: walk_error_path(err),
        reason: err.to_string(),
    }
}

fn walk_error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => walk_error_path(err),
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        _ => None,
    }
}

/// A pattern matches a whole path component: `build` excludes `app/build/R.java`
/// but not `src/rebuild/Leak.java`.
fn is_ignored(relative: &Path, patterns: &[String]) -> bool {
    relative.components().any(|component| {
        patterns
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| component.as_os_str() == p.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();
        path
    }

    fn patterns(names: &[&str]) -> WalkOptions {
        WalkOptions {
            ignore_patterns: names.iter().map(|n| n.to_string()).collect(),
            respect_ignore_files: false,
        }
    }

    fn relative(root: &Path, set: &WorkSet) -> Vec<PathBuf> {
        set.iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect()
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = WorkSet::gather(&dir.path().join("nope"), &WalkOptions::default()).unwrap_err();
        assert!(matches!(err, ScanError::SourceNotFound(_)));
    }

    #[test]
    fn test_single_file_is_one_element_set() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "Main.java");
        let set = WorkSet::gather(&file, &WalkOptions::default()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next(), Some(file.as_path()));
    }

    #[test]
    fn test_walk_is_sorted_and_honours_ignore_patterns() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/b/B.java");
        touch(dir.path(), "src/a/A.java");
        touch(dir.path(), "build/generated/R.java");
        touch(dir.path(), "src/main/AndroidManifest.xml");
        touch(dir.path(), "src/debug/deep/androidmanifest.XML");

        let set = WorkSet::gather(dir.path(), &patterns(&["build"])).unwrap();
        let names: Vec<_> = relative(dir.path(), &set)
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "java"))
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("src/a/A.java"), PathBuf::from("src/b/B.java")]
        );
        assert_eq!(
            set.find_manifest(),
            Some(dir.path().join("src/main/AndroidManifest.xml").as_path())
        );
    }

    #[test]
    fn test_patterns_match_whole_components_only() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/com/acme/rebuild/Leak.java");
        touch(dir.path(), "src/com/acme/buildutils/Util.java");
        touch(dir.path(), ".github/Ci.java");
        touch(dir.path(), ".gitignore");
        touch(dir.path(), "app/build/R.java");
        touch(dir.path(), ".git/config");

        let set = WorkSet::gather(dir.path(), &patterns(&["build", ".git"])).unwrap();
        assert_eq!(
            relative(dir.path(), &set),
            vec![
                PathBuf::from(".github/Ci.java"),
                PathBuf::from(".gitignore"),
                PathBuf::from("src/com/acme/buildutils/Util.java"),
                PathBuf::from("src/com/acme/rebuild/Leak.java"),
            ]
        );
    }

    #[test]
    fn test_project_ignore_files_are_not_honoured_by_default() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "secret/\n").unwrap();
        fs::write(dir.path().join(".ignore"), "*.txt\n").unwrap();
        touch(dir.path(), "src/com/acme/secret/Hidden.java");
        touch(dir.path(), "src/com/acme/ok/Fine.java");
        touch(dir.path(), "notes.txt");

        let all = WorkSet::gather(dir.path(), &patterns(&[])).unwrap();
        let names = relative(dir.path(), &all);
        assert!(names.contains(&PathBuf::from("src/com/acme/secret/Hidden.java")));
        assert!(names.contains(&PathBuf::from("notes.txt")));
        assert!(all.errors().is_empty());

        let opted_in = WalkOptions {
            ignore_patterns: Vec::new(),
            respect_ignore_files: true,
        };
        let filtered = relative(dir.path(), &WorkSet::gather(dir.path(), &opted_in).unwrap());
        assert!(!filtered.contains(&PathBuf::from("src/com/acme/secret/Hidden.java")));
        assert!(!filtered.contains(&PathBuf::from("notes.txt")));
        assert!(filtered.contains(&PathBuf::from("src/com/acme/ok/Fine.java")));
    }

    #[test]
    fn test_walk_errors_keep_the_offending_path() {
        let err = ignore::Error::WithDepth {
            depth: 2,
            err: Box::new(ignore::Error::WithPath {
                path: PathBuf::from("app/private"),
                err: Box::new(ignore::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "denied",
                ))),
            }),
        };
        match walk_anomaly(&err) {
            Anomaly::WalkFailed { path, reason } => {
                assert_eq!(path, Some(PathBuf::from("app/private")));
                assert!(reason.contains("denied"), "{reason}");
            }
            other => panic!("unexpected anomaly {other:?}"),
        }
    }
}

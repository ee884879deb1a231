//! Per-file shared state: raw text and parsed tree, each produced at most once.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Tree};

use super::report::{Anomaly, Diagnostics};
use crate::rules::java;

pub trait SourceLoader {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("parser produced no tree")]
    NoTree,

    #[error("syntax error near line {line}")]
    Syntax { line: usize },

    #[error("cannot load grammar: {0}")]
    Language(String),
}

pub trait SourceParser {
    fn parse(&self, text: &str) -> Result<Tree, ParseFailure>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaParser;

impl SourceParser for JavaParser {
    fn parse(&self, text: &str) -> Result<Tree, ParseFailure> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| ParseFailure::Language(e.to_string()))?;
        let tree = parser.parse(text, None).ok_or(ParseFailure::NoTree)?;
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(root).map(|n| n.start_position().row + 1).unwrap_or(1);
            return Err(ParseFailure::Syntax { line });
        }
        Ok(tree)
    }
}

fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

/// UTF-8 first, then ISO-8859-1, which maps every byte to a char.
pub fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!("Text is not valid UTF-8, decoding as ISO-8859-1");
            e.into_bytes().into_iter().map(char::from).collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileState {
    Unvisited,
    TextLoaded,
    TreeAttempted,
    NodeDispatched,
    Reset,
}

enum TextSlot {
    Pending,
    Loaded(String),
    Unreadable,
}

enum TreeSlot {
    Pending,
    NotSource,
    Parsed(Tree),
    Failed,
}

/// Shared state for one file. Owned by the scan loop, never by a rule.
pub struct FileContext {
    path: PathBuf,
    is_source: bool,
    state: FileState,
    text: TextSlot,
    tree: TreeSlot,
}

impl FileContext {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            is_source: java::is_java_file(path),
            state: FileState::Unvisited,
            text: TextSlot::Pending,
            tree: TreeSlot::Pending,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn is_source(&self) -> bool {
        self.is_source
    }

    fn advance(&mut self, next: FileState) {
        if next > self.state {
            self.state = next;
        }
    }

    /// Loads the text on first call. Returns whether text is available.
    pub fn ensure_text(&mut self, loader: &dyn SourceLoader, diag: &mut Diagnostics) -> bool {
        if matches!(self.text, TextSlot::Pending) {
            diag.stats.text_loads += 1;
            self.text = match loader.read_bytes(&self.path) {
                Ok(bytes) => TextSlot::Loaded(decode(bytes)),
                Err(e) => {
                    warn!(file = %self.path.display(), error = %e, "File unreadable, skipping");
                    diag.record(Anomaly::FileUnreadable {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    });
                    TextSlot::Unreadable
                }
            };
            self.advance(FileState::TextLoaded);
        }
        matches!(self.text, TextSlot::Loaded(_))
    }

    /// Parses on first call, loading text if needed. Non-source files never get a tree.
    pub fn ensure_tree(
        &mut self,
        loader: &dyn SourceLoader,
        parser: &dyn SourceParser,
        diag: &mut Diagnostics,
    ) -> bool {
        if matches!(self.tree, TreeSlot::Pending) {
            self.tree = if !self.is_source {
                TreeSlot::NotSource
            } else if !self.ensure_text(loader, diag) {
                TreeSlot::Failed
            } else {
                let text = self.text().unwrap_or_default();
                diag.stats.parses += 1;
                match parser.parse(text) {
                    Ok(tree) => TreeSlot::Parsed(tree),
                    Err(e) => {
                        warn!(file = %self.path.display(), error = %e, "Parse failed, tree rules skipped for this file");
                        diag.record(Anomaly::ParseFailed {
                            path: self.path.clone(),
                            reason: e.to_string(),
                        });
                        TreeSlot::Failed
                    }
                }
            };
            self.advance(FileState::TreeAttempted);
        }
        matches!(self.tree, TreeSlot::Parsed(_))
    }

    pub fn text(&self) -> Option<&str> {
        match &self.text {
            TextSlot::Loaded(text) => Some(text),
            _ => None,
        }
    }

    pub fn tree(&self) -> Option<&Tree> {
        match &self.tree {
            TreeSlot::Parsed(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn mark_dispatched(&mut self) {
        self.advance(FileState::NodeDispatched);
    }

    /// Drops text and tree. Always the last transition for a file.
    pub fn reset(&mut self) {
        self.text = TextSlot::Pending;
        self.tree = TreeSlot::Pending;
        self.state = FileState::Reset;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{CountingLoader, CountingParser};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_latin1_fallback_keeps_every_byte() {
        let text = decode(vec![b'c', 0xE9, b'!']);
        assert_eq!(text, "c\u{e9}!");
    }

    #[test]
    fn test_text_and_tree_are_built_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.java");
        fs::write(&path, "class A { void f() {} }").unwrap();
        let loader = CountingLoader::default();
        let parser = CountingParser::default();
        let mut diag = Diagnostics::default();

        let mut ctx = FileContext::new(&path);
        assert_eq!(ctx.state(), FileState::Unvisited);
        assert!(ctx.ensure_text(&loader, &mut diag));
        assert!(ctx.ensure_text(&loader, &mut diag));
        assert!(ctx.ensure_tree(&loader, &parser, &mut diag));
        assert!(ctx.ensure_tree(&loader, &parser, &mut diag));
        assert_eq!(ctx.state(), FileState::TreeAttempted);

        assert_eq!(loader.count(&path), 1);
        assert_eq!(*parser.parses.lock().unwrap(), 1);
        assert_eq!(diag.stats.text_loads, 1);

        ctx.reset();
        assert_eq!(ctx.state(), FileState::Reset);
        assert!(ctx.text().is_none());
        assert!(ctx.tree().is_none());
    }

    #[test]
    fn test_parse_failure_is_sticky_for_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Broken.java");
        fs::write(&path, "class Broken { void f( { }").unwrap();
        let parser = CountingParser::default();
        let mut diag = Diagnostics::default();

        let mut ctx = FileContext::new(&path);
        assert!(!ctx.ensure_tree(&FsLoader, &parser, &mut diag));
        assert!(!ctx.ensure_tree(&FsLoader, &parser, &mut diag));
        assert_eq!(*parser.parses.lock().unwrap(), 1);
        assert!(ctx.text().is_some());
        assert!(matches!(diag.anomalies.as_slice(), [Anomaly::ParseFailed { .. }]));
    }

    #[test]
    fn test_non_source_files_never_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strings.xml");
        fs::write(&path, "<resources/>").unwrap();
        let parser = CountingParser::default();
        let mut diag = Diagnostics::default();

        let mut ctx = FileContext::new(&path);
        assert!(!ctx.ensure_tree(&FsLoader, &parser, &mut diag));
        assert_eq!(*parser.parses.lock().unwrap(), 0);
        assert!(diag.anomalies.is_empty());
    }

    #[test]
    fn test_unreadable_file_is_recorded() {
        let dir = TempDir::new().unwrap();
        let mut diag = Diagnostics::default();
        let mut ctx = FileContext::new(&dir.path().join("Gone.java"));
        assert!(!ctx.ensure_text(&FsLoader, &mut diag));
        assert!(matches!(diag.anomalies.as_slice(), [Anomaly::FileUnreadable { .. }]));
    }
}

//! Helpers for reading Java syntax trees produced by `tree-sitter-java`.

use std::path::Path;
use tree_sitter::Node;

use crate::issue::Location;

pub fn is_java_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("java"))
        .unwrap_or(false)
}

pub fn node_text<'a>(node: Node<'_>, text: &'a str) -> &'a str {
    text.get(node.byte_range()).unwrap_or("")
}

/// 1-based line and column of the node's first character.
pub fn location(node: Node<'_>) -> Location {
    let start = node.start_position();
    Location::Point {
        line: start.row + 1,
        column: start.column + 1,
    }
}

/// A decomposed `method_invocation` node.
#[derive(Debug, Clone)]
pub struct MethodCall<'t, 'a> {
    pub node: Node<'t>,
    pub object: Option<Node<'t>>,
    pub name: &'a str,
    pub arguments: Vec<Node<'t>>,
}

impl<'t, 'a> MethodCall<'t, 'a> {
    pub fn from_node(node: Node<'t>, text: &'a str) -> Option<Self> {
        if node.kind() != "method_invocation" {
            return None;
        }
        let name = node_text(node.child_by_field_name("name")?, text);
        Some(Self {
            node,
            object: node.child_by_field_name("object"),
            name,
            arguments: node
                .child_by_field_name("arguments")
                .map(named_children)
                .unwrap_or_default(),
        })
    }

    pub fn object_text(&self, text: &'a str) -> Option<&'a str> {
        self.object.map(|o| node_text(o, text))
    }

    /// `true` when the receiver is exactly `qualifier`, e.g. `Log` in `Log.d(..)`.
    pub fn is_on(&self, qualifier: &str, text: &str) -> bool {
        self.object.map(|o| node_text(o, text)) == Some(qualifier)
    }

    pub fn argument(&self, index: usize) -> Option<Node<'t>> {
        self.arguments.get(index).copied()
    }
}

/// A decomposed `object_creation_expression` (`new Type(args)`).
#[derive(Debug, Clone)]
pub struct Construction<'t, 'a> {
    pub node: Node<'t>,
    pub type_name: &'a str,
    pub arguments: Vec<Node<'t>>,
}

impl<'t, 'a> Construction<'t, 'a> {
    pub fn from_node(node: Node<'t>, text: &'a str) -> Option<Self> {
        if node.kind() != "object_creation_expression" {
            return None;
        }
        let type_node = node.child_by_field_name("type")?;
        Some(Self {
            node,
            type_name: simple_type_name(node_text(type_node, text)),
            arguments: node
                .child_by_field_name("arguments")
                .map(named_children)
                .unwrap_or_default(),
        })
    }
}

pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Strips package qualifiers and generic arguments: `java.util.List<String>` -> `List`.
pub fn simple_type_name(raw: &str) -> &str {
    let base = raw.split('<').next().unwrap_or(raw).trim();
    base.rsplit('.').next().unwrap_or(base)
}

/// Contents of a string literal node, without quotes. `None` for other nodes.
pub fn string_value<'a>(node: Node<'_>, text: &'a str) -> Option<&'a str> {
    if node.kind() != "string_literal" {
        return None;
    }
    let raw = node_text(node, text);
    let inner = raw
        .strip_prefix("\"\"\"")
        .and_then(|s| s.strip_suffix("\"\"\""))
        .or_else(|| raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(raw);
    Some(inner)
}

pub fn is_bool_literal(node: Node<'_>, value: bool) -> bool {
    node.kind() == if value { "true" } else { "false" }
}

/// Named descendants of `node` in pre-order, `node` excluded.
pub fn descendants(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack: Vec<Node<'_>> = named_children(node).into_iter().rev().collect();
    while let Some(next) = stack.pop() {
        out.push(next);
        stack.extend(named_children(next).into_iter().rev());
    }
    out
}

/// Imported paths, e.g. `java.security.SecureRandom`, from the tree's import declarations.
pub fn imports<'a>(root: Node<'_>, text: &'a str) -> Vec<&'a str> {
    named_children(root)
        .into_iter()
        .filter(|n| n.kind() == "import_declaration")
        .map(|n| {
            node_text(n, text)
                .trim_start_matches("import")
                .trim()
                .trim_start_matches("static ")
                .trim_end_matches(';')
                .trim()
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::{named_nodes, parse};
    use super::*;

    const SOURCE: &str = r#"
import java.security.SecureRandom;
import static android.util.Log.d;

class Demo {
    void run() {
        Log.d("TAG", "hello");
        Object o = new java.util.ArrayList<String>(4);
    }
}
"#;

    #[test]
    fn test_method_call_parts() {
        let tree = parse(SOURCE);
        let call = named_nodes(&tree)
            .into_iter()
            .find_map(|n| MethodCall::from_node(n, SOURCE))
            .unwrap();
        assert_eq!(call.name, "d");
        assert!(call.is_on("Log", SOURCE));
        assert_eq!(call.arguments.len(), 2);
        assert_eq!(string_value(call.arguments[1], SOURCE), Some("hello"));
        assert_eq!(location(call.node), Location::Point { line: 7, column: 9 });
    }

    #[test]
    fn test_construction_uses_simple_type_name() {
        let tree = parse(SOURCE);
        let creation = named_nodes(&tree)
            .into_iter()
            .find_map(|n| Construction::from_node(n, SOURCE))
            .unwrap();
        assert_eq!(creation.type_name, "ArrayList");
        assert_eq!(creation.arguments.len(), 1);
    }

    #[test]
    fn test_imports_are_listed() {
        let tree = parse(SOURCE);
        assert_eq!(
            imports(tree.root_node(), SOURCE),
            vec!["java.security.SecureRandom", "android.util.Log.d"]
        );
    }

    #[test]
    fn test_java_extension_is_case_insensitive() {
        assert!(is_java_file(Path::new("a/B.JAVA")));
        assert!(!is_java_file(Path::new("a/B.kt")));
        assert!(!is_java_file(Path::new("java")));
    }
}

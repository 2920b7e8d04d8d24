use super::{extract_docstring, node_text};
use tree_sitter::Node;

/// Renders a compressed structural view of a file: imports, class and
/// function signatures, docstrings, `...` in place of bodies.
pub(super) fn generate(root: Node<'_>, file_path: &str, source: &str) -> String {
    let mut lines = vec![format!("# {file_path}"), String::new()];
    walk(root, 0, source, &mut lines);
    lines.join("\n")
}

fn walk(node: Node<'_>, indent: usize, source: &str, lines: &mut Vec<String>) {
    let pad = "    ".repeat(indent);
    match node.kind() {
        "class_definition" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            let name = node_text(name_node, source);
            match node.child_by_field_name("superclasses") {
                Some(super_node) => {
                    let bases = node_text(super_node, source);
                    lines.push(format!("{pad}class {name}{bases}:"));
                }
                None => lines.push(format!("{pad}class {name}:")),
            }
            if let Some(doc) = extract_docstring(node, source) {
                lines.push(format!("{pad}    \"\"\"{doc}\"\"\""));
            }
            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                for child in body.named_children(&mut cursor) {
                    walk(child, indent + 1, source, lines);
                }
            }
            lines.push(String::new());
        }
        "function_definition" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            let name = node_text(name_node, source);
            let params = node
                .child_by_field_name("parameters")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let mut signature = format!("{pad}def {name}{params}");
            if let Some(ret_node) = node.child_by_field_name("return_type") {
                let ret = node_text(ret_node, source);
                if !ret.is_empty() {
                    signature.push_str(" -> ");
                    signature.push_str(&ret);
                }
            }
            signature.push(':');
            lines.push(signature);
            if let Some(doc) = extract_docstring(node, source) {
                lines.push(format!("{pad}    \"\"\"{doc}\"\"\""));
            }
            lines.push(format!("{pad}    ..."));
            lines.push(String::new());
        }
        "import_statement" | "import_from_statement" => {
            lines.push(format!("{pad}{}", node_text(node, source)));
        }
        _ => {
            // Only top-level wrappers (if/try blocks and the module
            // itself) are transparent; statements inside bodies stay
            // hidden.
            if indent == 0 {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    walk(child, indent, source, lines);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::PythonParser;

    fn skeleton(source: &str) -> String {
        let mut parser = PythonParser::new().unwrap();
        parser.generate_skeleton("app.py", source).unwrap()
    }

    #[test]
    fn renders_imports_signatures_and_docstrings() {
        let source = r#"import os
from typing import Optional

CONFIG = {}

class Store(Base):
    """Persistent store."""

    def get(self, key) -> Optional[str]:
        """Look up a key."""
        return self.data.get(key)

def helper(x):
    return x * 2
"#;
        let expected = [
            "# app.py",
            "",
            "import os",
            "from typing import Optional",
            "class Store(Base):",
            "    \"\"\"Persistent store.\"\"\"",
            "    def get(self, key) -> Optional[str]:",
            "        \"\"\"Look up a key.\"\"\"",
            "        ...",
            "",
            "",
            "def helper(x):",
            "    ...",
            "",
        ]
        .join("\n");
        assert_eq!(skeleton(source), expected);
    }

    #[test]
    fn bodies_never_leak_into_the_skeleton() {
        let source = r#"
def transfer(src, dst, amount):
    src.balance -= amount
    dst.balance += amount
    return receipt(src, dst)
"#;
        let out = skeleton(source);
        assert!(out.contains("def transfer(src, dst, amount):"));
        assert!(out.contains("    ..."));
        assert!(!out.contains("balance"));
        assert!(!out.contains("return"));
    }

    #[test]
    fn top_level_conditional_blocks_are_transparent() {
        let source = r#"
if TYPE_CHECKING:
    from models import User

def run():
    pass
"#;
        let out = skeleton(source);
        assert!(out.contains("from models import User"));
        assert!(out.contains("def run():"));
    }

    #[test]
    fn nested_defs_stay_hidden() {
        let source = r#"
def outer():
    def inner():
        pass
    return inner
"#;
        let out = skeleton(source);
        assert!(out.contains("def outer():"));
        assert!(!out.contains("inner"));
    }

    #[test]
    fn class_without_bases_or_members() {
        let source = "class Marker:\n    pass\n";
        let expected = ["# app.py", "", "class Marker:", ""].join("\n");
        assert_eq!(skeleton(source), expected);
    }

    #[test]
    fn empty_source_yields_header_only() {
        assert_eq!(skeleton(""), "# app.py\n");
    }
}

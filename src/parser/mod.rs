use anyhow::{Context, Result, anyhow};
use tree_sitter::{Node, Parser};

mod extract;
mod skeleton;

pub use extract::ParsedFile;

/// Tree-sitter front end for Python sources. One instance per thread;
/// `tree_sitter::Parser` is not shareable.
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser
            .set_language(&language.into())
            .context("load python grammar")?;
        Ok(Self { parser })
    }

    /// Extract entities and edges from one file. `file_path` is the
    /// repo-relative path baked into every entity and edge id.
    pub fn parse_source(&mut self, file_path: &str, source: &str) -> Result<ParsedFile> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| anyhow!("parse {file_path}"))?;
        Ok(extract::extract(tree.root_node(), file_path, source))
    }

    /// Render the elided outline for one file: imports verbatim,
    /// signatures and docstrings kept, bodies dropped.
    pub fn generate_skeleton(&mut self, file_path: &str, source: &str) -> Result<String> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| anyhow!("parse {file_path}"))?;
        Ok(skeleton::generate(tree.root_node(), file_path, source))
    }
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}

fn span(node: Node<'_>) -> (i64, i64) {
    (
        node.start_position().row as i64 + 1,
        node.end_position().row as i64 + 1,
    )
}

fn line_of(node: Node<'_>) -> i64 {
    node.start_position().row as i64 + 1
}

fn function_signature(node: Node<'_>, name: &str, source: &str) -> String {
    let params = node
        .child_by_field_name("parameters")
        .map(|n| node_text(n, source))
        .unwrap_or_default();
    let mut signature = format!("def {name}{params}");
    if let Some(ret_node) = node.child_by_field_name("return_type") {
        let ret = node_text(ret_node, source);
        if !ret.is_empty() {
            signature.push_str(" -> ");
            signature.push_str(&ret);
        }
    }
    signature
}

fn class_signature(node: Node<'_>, name: &str, source: &str) -> String {
    match node.child_by_field_name("superclasses") {
        Some(sup) => format!("class {name}{}", node_text(sup, source)),
        None => format!("class {name}"),
    }
}

/// First string-literal expression statement at the top level of a
/// def/class body, with quotes and string prefixes stripped.
fn extract_docstring(node: Node<'_>, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        if child.kind() != "expression_statement" {
            continue;
        }
        let mut inner = child.walk();
        for grandchild in child.named_children(&mut inner) {
            if grandchild.kind() == "string" {
                let raw = node_text(grandchild, source);
                let doc = unquote_string_literal(&raw).unwrap_or(raw);
                let doc = doc.trim();
                return if doc.is_empty() {
                    None
                } else {
                    Some(doc.to_string())
                };
            }
        }
    }
    None
}

fn unquote_string_literal(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut idx = 0;
    for (offset, ch) in trimmed.char_indices() {
        if ch.is_ascii_alphabetic() {
            idx = offset + ch.len_utf8();
        } else {
            break;
        }
    }
    let rest = &trimmed[idx..];
    if rest.starts_with("'''") && rest.ends_with("'''") && rest.len() >= 6 {
        return Some(rest[3..rest.len() - 3].to_string());
    }
    if rest.starts_with("\"\"\"") && rest.ends_with("\"\"\"") && rest.len() >= 6 {
        return Some(rest[3..rest.len() - 3].to_string());
    }
    if rest.starts_with('"') && rest.ends_with('"') && rest.len() >= 2 {
        return Some(rest[1..rest.len() - 1].to_string());
    }
    if rest.starts_with('\'') && rest.ends_with('\'') && rest.len() >= 2 {
        return Some(rest[1..rest.len() - 1].to_string());
    }
    None
}

//! Python front-end using tree-sitter
//!
//! Builds an [`AnalysisUnit`]: parses the source once and records imports,
//! functions, classes and assigned variables.

use super::{AnalysisUnit, ImportInfo, ML_FRAMEWORKS};
use crate::models::{Location, Span};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Parse a Python file into an analysis unit
pub fn parse(path: &Path) -> Result<AnalysisUnit> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_source(&source, path)
}

/// Parse Python source code directly (useful for testing)
pub fn parse_source(source: &str, path: &Path) -> Result<AnalysisUnit> {
    let mut parser = Parser::new();
    let language = tree_sitter_python::LANGUAGE;
    parser
        .set_language(&language.into())
        .context("Failed to set Python language")?;

    let tree = parser
        .parse(source, None)
        .context("Failed to parse Python source")?;

    let mut symbols = Symbols::default();
    symbols.collect(tree.root_node(), source.as_bytes());

    let mut ml_constructs: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for import in &symbols.imports {
        let root = import.root_module();
        if ML_FRAMEWORKS.contains(&root) {
            ml_constructs
                .entry(root.to_string())
                .or_default()
                .push(import.line);
        }
    }

    Ok(AnalysisUnit {
        path: path.to_path_buf(),
        source: source.to_string(),
        tree,
        imports: symbols.imports,
        functions: symbols.functions,
        classes: symbols.classes,
        variables: symbols.variables,
        ml_constructs,
    })
}

enum Walk<'t> {
    Node(Node<'t>),
    LeaveScope,
}

#[derive(Default)]
struct Symbols {
    imports: Vec<ImportInfo>,
    functions: BTreeMap<String, Span>,
    classes: BTreeMap<String, Span>,
    variables: BTreeMap<String, Vec<u32>>,
}

impl Symbols {
    /// Pre-order walk over an explicit stack; depth is bounded by memory,
    /// not the thread stack
    fn collect(&mut self, root: Node, source: &[u8]) {
        let mut scope: Vec<String> = Vec::new();
        let mut stack = vec![Walk::Node(root)];
        while let Some(step) = stack.pop() {
            let node = match step {
                Walk::Node(node) => node,
                Walk::LeaveScope => {
                    scope.pop();
                    continue;
                }
            };
            match node.kind() {
                "function_definition" | "class_definition" => {
                    let Some(name) = node
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(source).ok())
                    else {
                        continue;
                    };
                    scope.push(name.to_string());
                    let qualified = scope.join(".");
                    if node.kind() == "class_definition" {
                        self.classes.insert(qualified, node_span(node));
                    } else {
                        self.functions.insert(qualified, node_span(node));
                    }
                    stack.push(Walk::LeaveScope);
                    if let Some(body) = node.child_by_field_name("body") {
                        stack.push(Walk::Node(body));
                    }
                    continue;
                }
                "import_statement" => self.collect_import(node, source),
                "import_from_statement" => self.collect_from_import(node, source),
                "assignment" => {
                    if let Some(left) = node.child_by_field_name("left") {
                        let line = node.start_position().row as u32 + 1;
                        let mut names = Vec::new();
                        bound_identifiers(left, source, &mut names);
                        for name in names {
                            let key = if scope.is_empty() {
                                name
                            } else {
                                format!("{}.{}", scope.join("."), name)
                            };
                            self.variables.entry(key).or_default().push(line);
                        }
                    }
                }
                _ => {}
            }

            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev().map(Walk::Node));
        }
    }

    fn collect_import(&mut self, node: Node, source: &[u8]) {
        let line = node.start_position().row as u32 + 1;
        // import module1, module2 as alias
        for child in node.children(&mut node.walk()) {
            match child.kind() {
                "dotted_name" => {
                    if let Ok(text) = child.utf8_text(source) {
                        self.imports.push(ImportInfo {
                            module: text.to_string(),
                            name: None,
                            alias: None,
                            line,
                        });
                    }
                }
                "aliased_import" => {
                    let module = child
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(source).ok());
                    let alias = child
                        .child_by_field_name("alias")
                        .and_then(|n| n.utf8_text(source).ok());
                    if let Some(module) = module {
                        self.imports.push(ImportInfo {
                            module: module.to_string(),
                            name: None,
                            alias: alias.map(str::to_string),
                            line,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn collect_from_import(&mut self, node: Node, source: &[u8]) {
        let line = node.start_position().row as u32 + 1;
        // from module import name1, name2 as alias
        let Some(module) = node
            .child_by_field_name("module_name")
            .and_then(|n| n.utf8_text(source).ok())
        else {
            return;
        };

        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            let (name, alias) = match child.kind() {
                "aliased_import" => (
                    child
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(source).ok()),
                    child
                        .child_by_field_name("alias")
                        .and_then(|n| n.utf8_text(source).ok()),
                ),
                _ => (child.utf8_text(source).ok(), None),
            };
            if let Some(name) = name {
                self.imports.push(ImportInfo {
                    module: module.to_string(),
                    name: Some(name.to_string()),
                    alias: alias.map(str::to_string),
                    line,
                });
            }
        }
    }
}

/// Identifiers bound by an assignment target, flattening tuple patterns
fn bound_identifiers(node: Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier" => {
            if let Ok(text) = node.utf8_text(source) {
                out.push(text.to_string());
            }
        }
        "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
        | "parenthesized_expression" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                bound_identifiers(child, source, out);
            }
        }
        _ => {}
    }
}

pub(crate) fn node_span(node: Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(
        Location::new(start.row as u32 + 1, start.column as u32),
        Location::new(end.row as u32 + 1, end.column as u32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collects_symbols() {
        let source = r#"
import numpy as np
import pandas as pd
from sklearn.preprocessing import StandardScaler, MinMaxScaler as MMS
import os

LIMIT = 3

class Trainer:
    def fit(self, X):
        scaled = X * 2
        return scaled

def load(path):
    df, meta = pd.read_csv(path), None
    return df
"#;
        let unit = parse_source(source, Path::new("train.py")).unwrap();

        assert_eq!(unit.imports.len(), 5);
        let mms = unit
            .imports
            .iter()
            .find(|imp| imp.alias.as_deref() == Some("MMS"))
            .unwrap();
        assert_eq!(mms.module, "sklearn.preprocessing");
        assert_eq!(mms.name.as_deref(), Some("MinMaxScaler"));
        assert_eq!(mms.bound_name(), "MMS");

        assert!(unit.classes.contains_key("Trainer"));
        assert!(unit.functions.contains_key("Trainer.fit"));
        assert!(unit.functions.contains_key("load"));
        assert_eq!(unit.variables.get("LIMIT"), Some(&vec![7]));
        assert!(unit.variables.contains_key("Trainer.fit.scaled"));
        assert!(unit.variables.contains_key("load.df"));
        assert!(unit.variables.contains_key("load.meta"));

        assert_eq!(unit.frameworks(), vec!["numpy", "pandas", "sklearn"]);
        assert!(unit.imports_module("sklearn"));
        assert!(!unit.imports_module("sk"));
        assert_eq!(unit.module_aliases().get("np"), Some(&"numpy"));
    }

    #[test]
    fn test_parse_empty_source() {
        let unit = parse_source("", Path::new("empty.py")).unwrap();
        assert!(unit.imports.is_empty());
        assert!(unit.functions.is_empty());
        assert_eq!(unit.root_node().kind(), "module");
    }

    #[test]
    fn test_deep_nesting_on_small_stack() {
        let terms: Vec<String> = (0..3000).map(|i| format!("a{i}")).collect();
        let source = format!("def f():\n    x = 1 + {}\n", terms.join(" + "));
        let unit = std::thread::Builder::new()
            .stack_size(1024 * 1024)
            .spawn(move || parse_source(&source, Path::new("deep.py")).unwrap())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(unit.variables.get("f.x"), Some(&vec![2]));
    }

    #[test]
    fn test_parse_missing_file() {
        assert!(parse(Path::new("/definitely/not/here.py")).is_err());
    }
}

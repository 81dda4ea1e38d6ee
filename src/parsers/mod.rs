//! Parsed-program input
//!
//! An [`AnalysisUnit`] is the read-only value every analysis consumes: the
//! tree-sitter syntax tree for one file plus the auxiliary symbol maps the
//! front-end derives from it. [`python`] builds units from Python source.

pub mod python;

use crate::models::Span;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Tree};

/// Top-level modules whose imports mark a unit as ML code
pub const ML_FRAMEWORKS: &[&str] = &[
    "sklearn",
    "torch",
    "tensorflow",
    "keras",
    "pandas",
    "numpy",
    "xgboost",
    "lightgbm",
    "jax",
    "scipy",
];

/// One imported binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInfo {
    /// Module path (`sklearn.preprocessing`)
    pub module: String,
    /// Imported member for `from m import name`
    pub name: Option<String>,
    pub alias: Option<String>,
    pub line: u32,
}

impl ImportInfo {
    /// The identifier this import introduces into the unit
    pub fn bound_name(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        match &self.name {
            Some(name) => name,
            None => self.module.split('.').next().unwrap_or(&self.module),
        }
    }

    /// Top-level package (`sklearn` for `sklearn.preprocessing`)
    pub fn root_module(&self) -> &str {
        self.module.split('.').next().unwrap_or(&self.module)
    }
}

/// Syntax tree plus front-end maps for a single source file
#[derive(Debug, Clone)]
pub struct AnalysisUnit {
    pub(crate) path: PathBuf,
    pub(crate) source: String,
    pub(crate) tree: Tree,
    pub imports: Vec<ImportInfo>,
    /// Qualified function name (`Trainer.fit`) -> definition span
    pub functions: BTreeMap<String, Span>,
    pub classes: BTreeMap<String, Span>,
    /// Scope-qualified variable name -> lines where it is assigned
    pub variables: BTreeMap<String, Vec<u32>>,
    /// ML framework -> lines where it is imported
    pub ml_constructs: BTreeMap<String, Vec<u32>>,
}

impl AnalysisUnit {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Frameworks the unit imports, sorted
    pub fn frameworks(&self) -> Vec<&str> {
        self.ml_constructs.keys().map(String::as_str).collect()
    }

    /// Whether some import binds a module equal to or nested under `module`
    pub fn imports_module(&self, module: &str) -> bool {
        self.imports.iter().any(|imp| {
            imp.module == module
                || imp
                    .module
                    .strip_prefix(module)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Bound name -> module for plain `import m [as a]` statements
    pub fn module_aliases(&self) -> BTreeMap<&str, &str> {
        self.imports
            .iter()
            .filter(|imp| imp.name.is_none())
            .map(|imp| (imp.bound_name(), imp.module.as_str()))
            .collect()
    }
}

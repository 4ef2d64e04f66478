use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tree_sitter::{Node, Parser};

use crate::error::{Result, RoutelensError};
use super::{node_text, DbOperation, OperationClassifier, SyntaxVisitor};

/// Qualified function identity: originating module plus function name.
///
/// Keying the index by module as well as name keeps same-named functions in
/// different modules from silently overwriting each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId {
    pub module: String,
    pub name: String,
}

impl FunctionId {
    pub fn new(source: &Path, name: &str) -> Self {
        Self {
            module: module_key(source),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

/// Derive a dotted module key from a source path
pub(crate) fn module_key(source: &Path) -> String {
    let trimmed = source.with_extension("");
    let parts: Vec<String> = trimmed
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .filter(|part| part != "." && part != "/")
        .collect();
    parts.join(".")
}

/// Analysis result for one function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInfo {
    /// Call targets in encounter order, duplicates preserved
    pub calls: Vec<String>,

    /// Names read anywhere in the body, parameters included
    pub data_references: BTreeSet<String>,

    /// Heuristically detected storage operations, encounter order
    pub db_operations: Vec<DbOperation>,

    /// Diagnostic set when analysis degraded; calls/references are empty then
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowInfo {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            error: Some(diagnostic.into()),
            ..Self::default()
        }
    }
}

/// Session-scoped store mapping function identity to its analyzed flow info.
///
/// Entries are upserted whole; re-analyzing an identity replaces its entry
/// (last write wins).
#[derive(Debug, Default)]
pub struct CallGraphIndex {
    entries: HashMap<FunctionId, FlowInfo>,
    by_name: HashMap<String, Vec<FunctionId>>,
}

impl CallGraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: FunctionId, info: FlowInfo) {
        let names = self.by_name.entry(id.name.clone()).or_default();
        if !names.contains(&id) {
            names.push(id.clone());
        }
        self.entries.insert(id, info);
    }

    pub fn get(&self, id: &FunctionId) -> Option<&FlowInfo> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &FunctionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Resolve a call-target name to an indexed identity.
    ///
    /// Only exact name matches resolve, so dotted chains almost never do.
    /// Preference order: the caller's own module, then a unique global match,
    /// then the lexicographically first candidate for determinism.
    pub fn resolve(&self, name: &str, module: Option<&str>) -> Option<&FunctionId> {
        let candidates = self.by_name.get(name)?;

        if let Some(module) = module {
            if let Some(local) = candidates.iter().find(|id| id.module == module) {
                return Some(local);
            }
        }

        candidates.iter().min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionId> {
        self.entries.keys()
    }
}

/// Analyzes one function at a time and records the result in the index.
///
/// Every failure mode degrades to an empty [`FlowInfo`] so that a single
/// unanalyzable handler never sinks the rest of the project map.
pub struct FlowAnalyzer {
    parser: Parser,
    classifier: OperationClassifier,
    index: CallGraphIndex,
}

impl FlowAnalyzer {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
            .map_err(|e| RoutelensError::Parser(format!("Failed to set Python language: {}", e)))?;

        Ok(Self {
            parser,
            classifier: OperationClassifier::new()?,
            index: CallGraphIndex::new(),
        })
    }

    pub fn index(&self) -> &CallGraphIndex {
        &self.index
    }

    /// Analyze a named function found in `source_path`.
    ///
    /// A missing or unreadable source degrades to the empty flow info with no
    /// diagnostic; a located function that fails to parse (or a name that is
    /// not defined in the file) degrades to the empty flow info with one.
    pub fn analyze(&mut self, name: &str, source_path: Option<&Path>) -> FlowInfo {
        let Some(path) = source_path else {
            return FlowInfo::empty();
        };
        if !path.exists() {
            return FlowInfo::empty();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => return FlowInfo::failed(format!("failed to read {}: {}", path.display(), e)),
        };

        let Some(tree) = self.parser.parse(&content, None) else {
            return FlowInfo::failed(format!("failed to parse {}", path.display()));
        };

        let Some(def) = find_function(tree.root_node(), &content, name) else {
            return FlowInfo::failed(format!(
                "function '{}' not found in {}",
                name,
                path.display()
            ));
        };

        let span = def.byte_range();
        let start_line = def.start_position().row + 1;
        self.analyze_span(name, path, &content, span, start_line)
    }

    /// Analyze a function whose definition span is already known.
    ///
    /// The span's text is re-parsed in isolation; `start_line` is the 1-based
    /// file line of the definition so diagnostics keep absolute line numbers.
    pub fn analyze_span(
        &mut self,
        name: &str,
        source_path: &Path,
        content: &str,
        span: std::ops::Range<usize>,
        start_line: usize,
    ) -> FlowInfo {
        let Some(window) = content.get(span) else {
            return FlowInfo::failed(format!("invalid source span for '{}'", name));
        };

        let Some(tree) = self.parser.parse(window, None) else {
            return FlowInfo::failed(format!("failed to parse function '{}'", name));
        };

        let root = tree.root_node();
        if root.has_error() {
            return FlowInfo::failed(format!("syntax errors in function '{}'", name));
        }

        let (calls, data_references) = SyntaxVisitor::collect(root, window).into_parts();
        let db_operations = self.classifier.classify(root, window, start_line);

        let info = FlowInfo {
            calls,
            data_references,
            db_operations,
            error: None,
        };

        let id = FunctionId::new(source_path, name);
        debug!("Indexed {} ({} calls, {} db ops)", id, info.calls.len(), info.db_operations.len());
        self.index.insert(id, info.clone());

        info
    }
}

/// Find the first `function_definition` named `name`, in document order
fn find_function<'tree>(node: Node<'tree>, source: &str, name: &str) -> Option<Node<'tree>> {
    if node.kind() == "function_definition" {
        if let Some(def_name) = node.child_by_field_name("name") {
            if node_text(def_name, source) == name {
                return Some(node);
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = find_function(child, source, name) {
            return Some(found);
        }
    }
    None
}

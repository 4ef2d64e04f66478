use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};

use crate::config::{ParsingConfig, ProjectConfig};
use crate::error::{Result, RoutelensError};
use super::flow::FlowAnalyzer;

/// Record of one scanned source file, kept for the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Path as walked, relative to the scan root where possible
    pub path: PathBuf,

    /// Content hash for change detection
    pub content_hash: String,

    /// Functions indexed from this file, in definition order
    pub functions: Vec<String>,
}

struct FunctionDef {
    name: String,
    span: std::ops::Range<usize>,
    start_line: usize,
}

/// Walks the project source tree and pre-analyzes every function definition.
///
/// The composer only ever reads the call-graph index, so every function that
/// should appear in a route's flow has to be indexed up front; scanning the
/// whole tree before composition is the simplest policy that guarantees that.
pub struct SourceScanner {
    parser: Parser,
    extensions: Vec<String>,
    max_file_size: usize,
    ignore_patterns: Vec<String>,
}

impl SourceScanner {
    pub fn new(project: &ProjectConfig, parsing: &ParsingConfig) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
            .map_err(|e| RoutelensError::Parser(format!("Failed to set Python language: {}", e)))?;

        Ok(Self {
            parser,
            extensions: parsing.file_extensions.clone(),
            max_file_size: parsing.max_file_size,
            ignore_patterns: project.ignore_patterns.clone(),
        })
    }

    /// Scan the given directories, feeding every found function through the
    /// analyzer. Unreadable or oversized files are skipped with a warning.
    pub fn scan_into(
        &mut self,
        dirs: &[PathBuf],
        analyzer: &mut FlowAnalyzer,
    ) -> Result<Vec<ScannedFile>> {
        let mut scanned = Vec::new();

        for dir in dirs {
            let walker = WalkBuilder::new(dir)
                .hidden(false)
                .git_ignore(true)
                .build();

            for entry in walker {
                let entry = entry.map_err(|e| RoutelensError::FileSystem(e.to_string()))?;
                let path = entry.path();

                if path.is_file() && self.should_scan(path) {
                    match self.scan_file(path, analyzer) {
                        Ok(file) => scanned.push(file),
                        Err(e) => warn!("Skipping {}: {}", path.display(), e),
                    }
                }
            }
        }

        Ok(scanned)
    }

    fn scan_file(&mut self, path: &Path, analyzer: &mut FlowAnalyzer) -> Result<ScannedFile> {
        let content = std::fs::read_to_string(path)?;

        if content.len() > self.max_file_size {
            return Err(RoutelensError::Parser(format!(
                "File {} exceeds maximum size limit",
                path.display()
            )));
        }

        let tree = self
            .parser
            .parse(&content, None)
            .ok_or_else(|| RoutelensError::Parser(format!("failed to parse {}", path.display())))?;

        let mut defs = Vec::new();
        collect_functions(tree.root_node(), &content, &mut defs);

        debug!("Scanned {} ({} functions)", path.display(), defs.len());

        let mut functions = Vec::new();
        for def in defs {
            // Duplicate names within one module follow last-write-wins.
            analyzer.analyze_span(&def.name, path, &content, def.span, def.start_line);
            functions.push(def.name);
        }

        Ok(ScannedFile {
            path: path.to_path_buf(),
            content_hash: calculate_hash(&content),
            functions,
        })
    }

    fn should_scan(&self, path: &Path) -> bool {
        let display = path.to_string_lossy();
        if self.ignore_patterns.iter().any(|pattern| display.contains(pattern.as_str())) {
            return false;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|known| known == ext))
            .unwrap_or(false)
    }
}

/// Collect every function definition in document order, nested ones and
/// class methods included
fn collect_functions(node: Node, source: &str, out: &mut Vec<FunctionDef>) {
    if node.kind() == "function_definition" {
        if let Some(name) = node.child_by_field_name("name") {
            out.push(FunctionDef {
                name: source[name.byte_range()].to_string(),
                span: node.byte_range(),
                start_line: node.start_position().row + 1,
            });
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_functions(child, source, out);
    }
}

/// Calculate SHA256 hash of content
fn calculate_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::flow::FunctionId;

    fn scanner() -> SourceScanner {
        let config = Config::default();
        SourceScanner::new(&config.project, &config.parsing).expect("scanner")
    }

    #[test]
    fn scan_indexes_top_level_nested_and_method_definitions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("service.py");
        std::fs::write(
            &file,
            "def outer():\n    def inner():\n        pass\n    return inner\n\nclass Repo:\n    def load(self, db):\n        return db.collection.find({})\n",
        )
        .expect("write");

        let mut analyzer = FlowAnalyzer::new().expect("analyzer");
        let scanned = scanner()
            .scan_into(&[dir.path().to_path_buf()], &mut analyzer)
            .expect("scan");

        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].functions, vec!["outer", "inner", "load"]);
        assert_eq!(analyzer.index().len(), 3);

        let load = FunctionId::new(&file, "load");
        let info = analyzer.index().get(&load).expect("indexed");
        assert_eq!(info.db_operations[0].kind, "mongodb");
    }

    #[test]
    fn non_source_files_and_ignored_paths_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.txt"), "def fake(): pass").expect("write");
        std::fs::create_dir(dir.path().join("__pycache__")).expect("mkdir");
        std::fs::write(dir.path().join("__pycache__").join("cached.py"), "def c():\n    pass\n")
            .expect("write");

        let mut analyzer = FlowAnalyzer::new().expect("analyzer");
        let scanned = scanner()
            .scan_into(&[dir.path().to_path_buf()], &mut analyzer)
            .expect("scan");

        assert!(scanned.is_empty());
        assert!(analyzer.index().is_empty());
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(calculate_hash("abc"), calculate_hash("abc"));
        assert_ne!(calculate_hash("abc"), calculate_hash("abd"));
    }
}

use regex::Regex;
use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::error::{Result, RoutelensError};
use super::attribute_chain;

/// A heuristically detected storage access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbOperation {
    /// Guessed backend kind ("sqlalchemy", "tortoise-orm", "mongodb", ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Full attribute chain as written in source
    pub operation: String,

    /// Absolute source line of the call
    pub line: usize,
}

/// Extra condition a rule requires beyond its keyword set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleGuard {
    /// Keywords alone decide
    None,
    /// Chain starts with a capitalized model-like prefix or contains "models."
    ModelPrefix,
    /// Chain mentions a collection or a "db." segment
    CollectionTarget,
}

/// One entry in the ordered classification table
#[derive(Debug, Clone)]
pub struct DbRule {
    pub tag: &'static str,
    pub keywords: &'static [&'static str],
    pub guard: RuleGuard,
}

/// Ordered rule table; rules later in the table can be shadowed by earlier
/// ones on overlapping keywords, which keeps classification deterministic.
fn default_rules() -> Vec<DbRule> {
    vec![
        DbRule {
            tag: "sqlalchemy",
            keywords: &[
                ".query", ".add", ".commit", ".delete", ".filter",
                ".all", ".first", ".get", ".update", ".execute",
            ],
            guard: RuleGuard::None,
        },
        DbRule {
            tag: "tortoise-orm",
            keywords: &[
                ".filter", ".get", ".create", ".delete", ".update",
                ".all", ".first", ".save", ".values",
            ],
            guard: RuleGuard::ModelPrefix,
        },
        DbRule {
            tag: "mongodb",
            keywords: &[".find", ".insert", ".update", ".delete", ".aggregate"],
            guard: RuleGuard::CollectionTarget,
        },
    ]
}

/// Tags attribute-chain calls that look like storage operations.
///
/// Best-effort substring matching, not a type-checked classifier: a chain that
/// coincidentally contains a keyword is tagged, one that spells an operation
/// differently is missed.
pub struct OperationClassifier {
    rules: Vec<DbRule>,
    model_prefix: Regex,
}

impl OperationClassifier {
    pub fn new() -> Result<Self> {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<DbRule>) -> Result<Self> {
        let model_prefix = Regex::new(r"^[A-Z][A-Za-z0-9_]*\.")
            .map_err(|e| RoutelensError::Config(format!("invalid model prefix pattern: {}", e)))?;
        Ok(Self { rules, model_prefix })
    }

    /// Re-traverse the function tree and record every rule match.
    ///
    /// `line_offset` is the 1-based file line of the supplied text window's
    /// first line, so recorded lines stay accurate for sliced function bodies.
    pub fn classify(&self, root: Node, source: &str, line_offset: usize) -> Vec<DbOperation> {
        let mut operations = Vec::new();
        self.visit(root, source, line_offset, &mut operations);
        operations
    }

    fn visit(&self, node: Node, source: &str, line_offset: usize, out: &mut Vec<DbOperation>) {
        if node.kind() == "call" {
            if let Some(func) = node.child_by_field_name("function") {
                if func.kind() == "attribute" {
                    let chain = attribute_chain(func, source);
                    // First matching rule wins; later families are never tested.
                    if let Some(rule) = self.rules.iter().find(|rule| self.matches(rule, &chain)) {
                        out.push(DbOperation {
                            kind: rule.tag.to_string(),
                            operation: chain,
                            line: line_offset + node.start_position().row,
                        });
                    }
                }
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, source, line_offset, out);
        }
    }

    fn matches(&self, rule: &DbRule, chain: &str) -> bool {
        if !rule.keywords.iter().any(|keyword| chain.contains(keyword)) {
            return false;
        }

        match rule.guard {
            RuleGuard::None => true,
            RuleGuard::ModelPrefix => {
                self.model_prefix.is_match(chain) || chain.contains("models.")
            }
            RuleGuard::CollectionTarget => {
                chain.contains("collection") || chain.contains("db.")
            }
        }
    }
}

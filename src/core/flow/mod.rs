//! Code-flow analysis for route handler functions
//!
//! The flow engine parses a single function body in isolation, extracts the
//! calls it makes and the names it reads, tags likely storage operations, and
//! composes the per-function results into per-route execution trees.

mod visitor;
mod classifier;
mod analyzer;
mod composer;

pub use visitor::SyntaxVisitor;
pub use classifier::{OperationClassifier, DbOperation, DbRule, RuleGuard};
pub use analyzer::{FlowAnalyzer, FlowInfo, FunctionId, CallGraphIndex};
pub(crate) use analyzer::module_key;
pub use composer::{FlowComposer, RouteFlow, CallChainNode, DataFlowNode};

use tree_sitter::Node;

/// Rebuild a dotted attribute chain like `a.b.c` from an `attribute` node.
///
/// Chain bases that are not plain names or further attribute access (call
/// results, subscripts, literals) collapse to the token `"unknown"`.
pub(crate) fn attribute_chain(node: Node, source: &str) -> String {
    match node.kind() {
        "attribute" => {
            let base = node
                .child_by_field_name("object")
                .map(|object| attribute_chain(object, source))
                .unwrap_or_else(|| "unknown".to_string());
            let attr = node
                .child_by_field_name("attribute")
                .map(|attr| node_text(attr, source))
                .unwrap_or_else(|| "unknown".to_string());
            format!("{}.{}", base, attr)
        }
        "identifier" => node_text(node, source),
        _ => "unknown".to_string(),
    }
}

/// Extract the text content of a node
pub(crate) fn node_text(node: Node, source: &str) -> String {
    source[node.byte_range()].to_string()
}

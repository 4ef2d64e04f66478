use std::collections::BTreeSet;
use tree_sitter::Node;

use super::{attribute_chain, node_text};

/// Walks a parsed function body once, collecting call targets and name reads.
///
/// Call targets keep their spelling from the source: a bare call yields the
/// bare name, a method call yields the full dotted chain, and anything else
/// (calling a call result, a subscript, a lambda) yields `"unknown"`. Order is
/// encounter order and duplicates are preserved.
pub struct SyntaxVisitor {
    calls: Vec<String>,
    references: BTreeSet<String>,
}

impl SyntaxVisitor {
    /// Traverse the tree rooted at `root` and collect calls and references.
    pub fn collect(root: Node, source: &str) -> Self {
        let mut visitor = Self {
            calls: Vec::new(),
            references: BTreeSet::new(),
        };
        visitor.visit(root, source);
        visitor
    }

    /// Call targets in encounter order, duplicates preserved
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Names read anywhere in the function, parameters included
    pub fn references(&self) -> &BTreeSet<String> {
        &self.references
    }

    pub fn into_parts(self) -> (Vec<String>, BTreeSet<String>) {
        (self.calls, self.references)
    }

    fn visit(&mut self, node: Node, source: &str) {
        match node.kind() {
            "call" => {
                let target = node
                    .child_by_field_name("function")
                    .map(|func| match func.kind() {
                        "identifier" => node_text(func, source),
                        "attribute" => attribute_chain(func, source),
                        _ => "unknown".to_string(),
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                self.calls.push(target);
            }
            "identifier" => {
                if is_loaded_name(node) {
                    self.references.insert(node_text(node, source));
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, source);
        }
    }
}

/// Whether an identifier is a value read rather than a binding target or a
/// member name. Approximates load/store context from the parent node shape.
fn is_loaded_name(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };

    let named_field = |field: &str| {
        parent
            .child_by_field_name(field)
            .map(|child| child.id() == node.id())
            .unwrap_or(false)
    };

    match parent.kind() {
        // Member names in `a.b` are not standalone reads; the base is.
        "attribute" => !named_field("attribute"),
        // Definition names and keyword-argument names are not reads.
        "function_definition" | "class_definition" => !named_field("name"),
        "keyword_argument" => !named_field("name"),
        // Binding targets: `x = ...`, `x += ...`, `for x in ...`
        "assignment" | "augmented_assignment" | "for_statement" => !named_field("left"),
        // Unpacking targets like `a, b = ...`
        "pattern_list" | "tuple_pattern" | "list_pattern" => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse_and_collect(source: &str) -> (Vec<String>, BTreeSet<String>) {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
            .expect("load python grammar");
        let tree = parser.parse(source, None).expect("parse");
        SyntaxVisitor::collect(tree.root_node(), source).into_parts()
    }

    #[test]
    fn function_without_calls_yields_nothing() {
        let (calls, _) = parse_and_collect("def f():\n    return 1\n");
        assert!(calls.is_empty());
    }

    #[test]
    fn bare_call_records_name() {
        let (calls, _) = parse_and_collect("def f():\n    return helper()\n");
        assert_eq!(calls, vec!["helper".to_string()]);
    }

    #[test]
    fn method_call_records_dotted_chain() {
        let (calls, _) = parse_and_collect("def f(obj):\n    obj.method()\n");
        assert_eq!(calls, vec!["obj.method".to_string()]);
    }

    #[test]
    fn deep_chain_is_rebuilt_left_to_right() {
        let (calls, _) = parse_and_collect("def f(a):\n    a.b.c.d()\n");
        assert_eq!(calls, vec!["a.b.c.d".to_string()]);
    }

    #[test]
    fn call_result_base_collapses_to_unknown() {
        let (calls, _) = parse_and_collect("def f():\n    make().run()\n");
        // The inner call is encountered as part of the chain base too.
        assert!(calls.contains(&"unknown.run".to_string()));
        assert!(calls.contains(&"make".to_string()));
    }

    #[test]
    fn unrecognized_callee_shape_records_unknown() {
        let (calls, _) = parse_and_collect("def f(fns):\n    fns[0]()\n");
        assert_eq!(calls, vec!["unknown".to_string()]);
    }

    #[test]
    fn duplicates_and_order_are_preserved() {
        let (calls, _) = parse_and_collect("def f():\n    a()\n    b()\n    a()\n");
        assert_eq!(calls, vec!["a", "b", "a"]);
    }

    #[test]
    fn references_include_parameters_and_reads() {
        let (_, refs) = parse_and_collect("def f(item_id, db):\n    row = db.fetch(item_id)\n    return row\n");
        assert!(refs.contains("item_id"));
        assert!(refs.contains("db"));
        assert!(refs.contains("row"));
    }

    #[test]
    fn references_exclude_assignment_targets_and_member_names() {
        let (_, refs) = parse_and_collect("def f(x):\n    total = x.value\n    return total\n");
        // `total` is read on the return line; plain store targets never are.
        let (_, refs2) = parse_and_collect("def g(x):\n    total = x.value\n");
        assert!(refs.contains("total"));
        assert!(!refs2.contains("total"));
        assert!(!refs.contains("value"));
        assert!(refs.contains("x"));
    }

    #[test]
    fn loop_targets_are_not_reads() {
        let (_, refs) = parse_and_collect("def f(rows):\n    for row in rows:\n        pass\n");
        assert!(refs.contains("rows"));
        assert!(!refs.contains("row"));
    }
}

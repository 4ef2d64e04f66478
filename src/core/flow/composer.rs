use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::routes::RouteDescriptor;
use super::analyzer::{module_key, CallGraphIndex, FunctionId};
use super::DbOperation;

/// One node in a route's call-chain tree.
///
/// Empty `calls` means a true leaf, an unresolved target, or a cycle break
/// point; the structure does not distinguish them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChainNode {
    pub function: String,
    pub calls: Vec<CallChainNode>,
}

/// One node in a route's data-flow tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFlowNode {
    pub references: BTreeSet<String>,
    pub called_functions: BTreeMap<String, DataFlowNode>,
}

/// Aggregated execution flow for one route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteFlow {
    pub endpoint: String,
    pub path: String,
    pub methods: Vec<String>,
    pub call_chain: Vec<CallChainNode>,
    pub data_flow: DataFlowNode,
    pub db_operations: Vec<DbOperation>,
}

/// Expands the call-graph index into per-route execution trees.
///
/// The composer only reads the index; functions missing from it produce empty
/// subtrees and never trigger fresh parsing. Every traversal threads a
/// visited set by value, so cycle detection is per path: a function may
/// appear in two sibling branches of the same tree, but never twice on one
/// path.
pub struct FlowComposer<'a> {
    index: &'a CallGraphIndex,
}

impl<'a> FlowComposer<'a> {
    pub fn new(index: &'a CallGraphIndex) -> Self {
        Self { index }
    }

    /// Build the complete execution flow map, keyed by route endpoint
    pub fn build_execution_flow(&self, routes: &[RouteDescriptor]) -> BTreeMap<String, RouteFlow> {
        let mut route_flows = BTreeMap::new();

        for route in routes {
            let module = route.source.as_deref().map(module_key);
            let entry = self
                .index
                .resolve(&route.endpoint, module.as_deref())
                .cloned();

            let flow = match entry {
                Some(id) => RouteFlow {
                    endpoint: route.endpoint.clone(),
                    path: route.path.clone(),
                    methods: route.methods.clone(),
                    call_chain: self.build_call_chain(&id, HashSet::new()),
                    data_flow: self.trace_data_flow(&id, HashSet::new()),
                    db_operations: self.extract_db_operations(&id, HashSet::new()),
                },
                None => {
                    debug!("Route endpoint '{}' is not in the call graph", route.endpoint);
                    RouteFlow {
                        endpoint: route.endpoint.clone(),
                        path: route.path.clone(),
                        methods: route.methods.clone(),
                        call_chain: Vec::new(),
                        data_flow: DataFlowNode::default(),
                        db_operations: Vec::new(),
                    }
                }
            };

            route_flows.insert(route.endpoint.clone(), flow);
        }

        route_flows
    }

    /// Recursively expand the calls recorded for `id` into a tree.
    ///
    /// Every recorded call target becomes a node, resolved or not; only
    /// resolved targets recurse. Each sibling branch gets its own copy of the
    /// visited set.
    pub fn build_call_chain(
        &self,
        id: &FunctionId,
        mut visited: HashSet<FunctionId>,
    ) -> Vec<CallChainNode> {
        if visited.contains(id) {
            return Vec::new(); // cycle break
        }
        visited.insert(id.clone());

        let Some(info) = self.index.get(id) else {
            return Vec::new();
        };

        info.calls
            .iter()
            .map(|target| CallChainNode {
                function: target.clone(),
                calls: self
                    .index
                    .resolve(target, Some(id.module.as_str()))
                    .map(|callee| self.build_call_chain(callee, visited.clone()))
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Recursively expand the names read by `id` and everything it calls
    pub fn trace_data_flow(&self, id: &FunctionId, mut visited: HashSet<FunctionId>) -> DataFlowNode {
        if visited.contains(id) {
            return DataFlowNode::default();
        }
        visited.insert(id.clone());

        let Some(info) = self.index.get(id) else {
            return DataFlowNode::default();
        };

        let mut called_functions = BTreeMap::new();
        for target in &info.calls {
            let child = self
                .index
                .resolve(target, Some(id.module.as_str()))
                .map(|callee| self.trace_data_flow(callee, visited.clone()))
                .unwrap_or_default();
            called_functions.insert(target.clone(), child);
        }

        DataFlowNode {
            references: info.data_references.clone(),
            called_functions,
        }
    }

    /// Flatten the storage operations of `id` and every reachable callee.
    ///
    /// A function's own operations come first, then its callees' in call
    /// order.
    pub fn extract_db_operations(
        &self,
        id: &FunctionId,
        mut visited: HashSet<FunctionId>,
    ) -> Vec<DbOperation> {
        if visited.contains(id) {
            return Vec::new();
        }
        visited.insert(id.clone());

        let Some(info) = self.index.get(id) else {
            return Vec::new();
        };

        let mut operations = info.db_operations.clone();
        for target in &info.calls {
            if let Some(callee) = self.index.resolve(target, Some(id.module.as_str())) {
                operations.extend(self.extract_db_operations(callee, visited.clone()));
            }
        }

        operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::FlowInfo;

    fn id(name: &str) -> FunctionId {
        FunctionId { module: "app".to_string(), name: name.to_string() }
    }

    fn entry(calls: &[&str], refs: &[&str], ops: &[(&str, &str, usize)]) -> FlowInfo {
        FlowInfo {
            calls: calls.iter().map(|c| c.to_string()).collect(),
            data_references: refs.iter().map(|r| r.to_string()).collect(),
            db_operations: ops
                .iter()
                .map(|(kind, operation, line)| DbOperation {
                    kind: kind.to_string(),
                    operation: operation.to_string(),
                    line: *line,
                })
                .collect(),
            error: None,
        }
    }

    fn route(endpoint: &str) -> RouteDescriptor {
        RouteDescriptor {
            endpoint: endpoint.to_string(),
            path: format!("/{}", endpoint),
            methods: vec!["GET".to_string()],
            source: None,
        }
    }

    #[test]
    fn cyclic_graph_terminates_with_an_empty_leaf() {
        let mut index = CallGraphIndex::new();
        index.insert(id("a"), entry(&["b"], &[], &[]));
        index.insert(id("b"), entry(&["a"], &[], &[]));

        let composer = FlowComposer::new(&index);
        let chain = composer.build_call_chain(&id("a"), HashSet::new());

        // a -> b -> a(cycle break, empty calls)
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].function, "b");
        assert_eq!(chain[0].calls.len(), 1);
        assert_eq!(chain[0].calls[0].function, "a");
        assert!(chain[0].calls[0].calls.is_empty());
    }

    #[test]
    fn self_recursive_functions_terminate_everywhere() {
        let mut index = CallGraphIndex::new();
        index.insert(id("loop"), entry(&["loop"], &["n"], &[("sqlalchemy", "s.add", 3)]));

        let composer = FlowComposer::new(&index);
        let chain = composer.build_call_chain(&id("loop"), HashSet::new());
        assert_eq!(chain[0].function, "loop");
        assert!(chain[0].calls.is_empty());

        let flow = composer.trace_data_flow(&id("loop"), HashSet::new());
        assert!(flow.called_functions["loop"].references.is_empty());

        let ops = composer.extract_db_operations(&id("loop"), HashSet::new());
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn sibling_branches_may_repeat_a_function() {
        let mut index = CallGraphIndex::new();
        index.insert(id("top"), entry(&["left", "right"], &[], &[]));
        index.insert(id("left"), entry(&["shared"], &[], &[]));
        index.insert(id("right"), entry(&["shared"], &[], &[]));
        index.insert(id("shared"), entry(&["helper"], &[], &[]));
        index.insert(id("helper"), entry(&[], &[], &[]));

        let composer = FlowComposer::new(&index);
        let chain = composer.build_call_chain(&id("top"), HashSet::new());

        // `shared` expands fully under both siblings: cycle detection is per
        // path, not per traversal.
        for branch in &chain {
            assert_eq!(branch.calls[0].function, "shared");
            assert_eq!(branch.calls[0].calls[0].function, "helper");
        }
    }

    #[test]
    fn unresolved_targets_become_leaves() {
        let mut index = CallGraphIndex::new();
        index.insert(id("h"), entry(&["session.commit", "missing"], &[], &[]));

        let composer = FlowComposer::new(&index);
        let chain = composer.build_call_chain(&id("h"), HashSet::new());

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].function, "session.commit");
        assert!(chain[0].calls.is_empty());
        assert_eq!(chain[1].function, "missing");
        assert!(chain[1].calls.is_empty());
    }

    #[test]
    fn db_operations_flatten_across_the_reachable_set() {
        let mut index = CallGraphIndex::new();
        index.insert(id("h"), entry(&["helper"], &[], &[]));
        index.insert(
            id("helper"),
            entry(&[], &[], &[("mongodb", "db.collection.find", 12)]),
        );

        let composer = FlowComposer::new(&index);
        let ops = composer.extract_db_operations(&id("h"), HashSet::new());

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, "mongodb");
        assert_eq!(ops[0].operation, "db.collection.find");
    }

    #[test]
    fn data_flow_nests_by_callee_name() {
        let mut index = CallGraphIndex::new();
        index.insert(id("h"), entry(&["helper"], &["request"], &[]));
        index.insert(id("helper"), entry(&[], &["payload", "db"], &[]));

        let composer = FlowComposer::new(&index);
        let flow = composer.trace_data_flow(&id("h"), HashSet::new());

        assert!(flow.references.contains("request"));
        assert!(flow.called_functions["helper"].references.contains("payload"));
    }

    #[test]
    fn routes_missing_from_the_index_yield_empty_flows() {
        let index = CallGraphIndex::new();
        let composer = FlowComposer::new(&index);

        let flows = composer.build_execution_flow(&[route("ghost")]);
        let flow = &flows["ghost"];
        assert!(flow.call_chain.is_empty());
        assert!(flow.db_operations.is_empty());
        assert_eq!(flow.data_flow, DataFlowNode::default());
        assert_eq!(flow.methods, vec!["GET".to_string()]);
    }

    #[test]
    fn execution_flow_is_keyed_by_endpoint() {
        let mut index = CallGraphIndex::new();
        index.insert(id("list_items"), entry(&["fetch"], &["db"], &[]));
        index.insert(
            id("fetch"),
            entry(&[], &["db"], &[("sqlalchemy", "db.query", 5)]),
        );

        let composer = FlowComposer::new(&index);
        let flows = composer.build_execution_flow(&[route("list_items")]);

        let flow = &flows["list_items"];
        assert_eq!(flow.call_chain[0].function, "fetch");
        assert_eq!(flow.db_operations.len(), 1);
    }
}

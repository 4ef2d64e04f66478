mod engine;
mod report;
mod routes;
mod scanner;

// Code-flow analysis engine
mod flow;

pub use flow::{
    FlowAnalyzer, FlowComposer, FlowInfo, FunctionId, CallGraphIndex,
    SyntaxVisitor, OperationClassifier, DbOperation, DbRule, RuleGuard,
    RouteFlow, CallChainNode, DataFlowNode,
};
pub use report::FlowReport;
pub use routes::{load_manifest, RouteDescriptor};
pub use scanner::{ScannedFile, SourceScanner};

// Export the main engine
pub use engine::Engine;

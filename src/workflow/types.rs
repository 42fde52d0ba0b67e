/// Core workflow type definitions
///
/// Defines the structures for workflows, nodes, and edges. These types are
/// serialized/deserialized from JSON for persistence and form the arena the
/// runtime executes and the loop expander clones.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete workflow definition containing nodes and their connections
///
/// Workflows are stored as JSON in SQLite and loaded into a petgraph arena
/// for execution. Every node without outgoing edges is a sink and is demanded
/// once per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-countdown")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// List of nodes in this workflow
    pub nodes: Vec<Node>,
    /// List of edges connecting node outputs to node inputs
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A single node in the workflow graph
///
/// Each node has a type that determines its behavior and a params object
/// holding literal values for its named inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Unique node identifier within the workflow (e.g., "n1", "loop-open").
    /// Clones created by loop expansion carry an `@<seq>` suffix.
    pub id: String,
    /// The type of node which determines execution behavior
    pub node_type: NodeType,
    /// Literal input values keyed by input name; a linked input of the same
    /// name takes precedence
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, params: Value) -> Self {
        Self { id: id.into(), node_type, params }
    }

    /// Identity shared by a node and all its loop clones
    pub fn base_id(&self) -> &str {
        base_id(&self.id)
    }

    /// Literal value of a named input, if set in params
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

/// Strip the clone suffix from a node id
pub fn base_id(id: &str) -> &str {
    id.split_once('@').map_or(id, |(base, _)| base)
}

/// Available node types for the loopway engine
///
/// Control nodes (cycle and loop markers) carry the core iteration logic;
/// the rest are the small set of data nodes loops are built around.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Literal value source
    /// Expected params: { "value": 42 }
    Constant,

    /// Records its input into the run report
    /// Expected inputs: value
    Output,

    /// Restricted expression evaluated against the variable store
    /// Expected params: { "expression": "a * 2", "output_type": "INT", "persist": false }
    /// Optional inputs: a, b, c
    Formula,

    /// Named variable store write
    /// Expected params: { "name": "counter", "reset": false }
    /// Optional inputs: input
    MemoryStorage,

    /// Comparison selecting one of two lazily evaluated branches
    /// Expected params: { "condition": "A > B", "invert": false }
    /// Inputs: a, b, if_true (lazy), if_false (lazy)
    IfCondition,

    /// Interrupts the run when it receives a value
    /// Expected params: { "disable": false }
    Halt,

    /// Cross-run counter; begins or resets the cycle state
    /// Expected params: { "start": 0, "step": 1, "end": 10, "manual_reset": false, "auto_reset": true }
    Cycle,

    /// Delivers the payload carried over from the previous run
    /// Inputs: cycle, data, aux, index_override
    CycleContinue,

    /// Advances the cycle and stores the payload for the next run
    /// Inputs: cycle, data, aux
    CycleEnd,

    /// Start of an intra-run loop body
    /// Expected params: { "start": 0, "step": 1, "end": 5, "condition": "index < 3" }
    /// Inputs: index_override, data, aux, aux2, aux3 (lazy)
    LoopOpen,

    /// End of an intra-run loop body; expands the next iteration
    /// Expected params: { "condition": "True" }
    /// Inputs: status, data, aux, aux2, aux3
    LoopClose,
}

impl NodeType {
    /// Number of output slots the node produces
    pub fn output_count(self) -> usize {
        match self {
            NodeType::Output => 0,
            NodeType::Constant
            | NodeType::Formula
            | NodeType::MemoryStorage
            | NodeType::IfCondition
            | NodeType::Halt => 1,
            NodeType::Cycle | NodeType::CycleEnd => 2,
            NodeType::CycleContinue => 3,
            NodeType::LoopClose => 4,
            NodeType::LoopOpen => 6,
        }
    }
}

/// Connection from one node output slot to a named input of another node
///
/// The execution engine uses these to build the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Source node ID
    pub from: String,
    /// Output slot of the source node
    #[serde(default)]
    pub output: usize,
    /// Target node ID
    pub to: String,
    /// Input name on the target node
    pub input: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, output: usize, to: impl Into<String>, input: impl Into<String>) -> Self {
        Self { from: from.into(), output, to: to.into(), input: input.into() }
    }
}

impl Workflow {
    /// Structural checks run before a workflow is stored or executed
    ///
    /// Node ids must be unique and free of the clone separator, edges must
    /// reference known nodes and existing output slots, and each input may be
    /// linked at most once.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut ids = std::collections::HashMap::new();
        for node in &self.nodes {
            if node.id.is_empty() || node.id.contains('@') {
                return Err(anyhow::anyhow!("Invalid node id '{}'", node.id));
            }
            if ids.insert(node.id.as_str(), node.node_type).is_some() {
                return Err(anyhow::anyhow!("Duplicate node id '{}'", node.id));
            }
        }

        let mut linked = std::collections::HashSet::new();
        for edge in &self.edges {
            let source = ids.get(edge.from.as_str())
                .ok_or_else(|| anyhow::anyhow!("Edge source not found: {}", edge.from))?;
            if !ids.contains_key(edge.to.as_str()) {
                return Err(anyhow::anyhow!("Edge target not found: {}", edge.to));
            }
            if edge.output >= source.output_count() {
                return Err(anyhow::anyhow!(
                    "Node '{}' ({:?}) has no output slot {}", edge.from, source, edge.output
                ));
            }
            if !linked.insert((edge.to.as_str(), edge.input.as_str())) {
                return Err(anyhow::anyhow!("Input '{}' of node '{}' is linked twice", edge.input, edge.to));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "test".into(),
            nodes: vec![
                Node::new("c", NodeType::Constant, json!({"value": 1})),
                Node::new("out", NodeType::Output, json!({})),
            ],
            edges,
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let wf: Workflow = serde_json::from_value(json!({
            "id": "wf", "name": "n",
            "nodes": [{"id": "a", "node_type": "LoopOpen"}],
        })).unwrap();
        assert_eq!(wf.nodes[0].params, json!({}));
        assert!(wf.edges.is_empty());
    }

    #[test]
    fn base_id_strips_clone_suffix() {
        assert_eq!(base_id("body@12"), "body");
        assert_eq!(base_id("body"), "body");
    }

    #[test]
    fn validate_accepts_linked_graph() {
        assert!(workflow(vec![Edge::new("c", 0, "out", "value")]).validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_edges() {
        assert!(workflow(vec![Edge::new("x", 0, "out", "value")]).validate().is_err());
        assert!(workflow(vec![Edge::new("c", 1, "out", "value")]).validate().is_err());
        assert!(workflow(vec![
            Edge::new("c", 0, "out", "value"),
            Edge::new("c", 0, "out", "value"),
        ]).validate().is_err());
    }

    #[test]
    fn validate_rejects_reserved_ids() {
        let mut wf = workflow(vec![]);
        wf.nodes[0].id = "c@1".into();
        assert!(wf.validate().is_err());
    }
}

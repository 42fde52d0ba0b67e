/// Execution arena over a petgraph `StableDiGraph`
///
/// Holds the nodes of one run, addressed by stable `NodeIndex`. Loop
/// expansions append cloned nodes and edges; nothing already in the arena is
/// ever modified or removed while a run is in progress.

use crate::control::{GraphFragment, Topology};
use crate::eval::Value;
use crate::workflow::types::{Edge, Node, Workflow};
use anyhow::Result;
use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// Edge weight: which output slot feeds which named input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub output: usize,
    pub input: String,
}

/// A linked input as seen from the consuming node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub input: String,
    pub from: NodeIndex,
    pub output: usize,
}

#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    /// The petgraph arena
    graph: StableDiGraph<Node, Link>,
    /// Mapping from node ID to graph node index
    node_id_to_index: HashMap<String, NodeIndex>,
    /// Input values bound by loop expansion, overriding params
    bindings: HashMap<NodeIndex, HashMap<String, Value>>,
    /// Nodes of the workflow as declared, before any expansion
    declared: Vec<NodeIndex>,
}

impl ExecutionGraph {
    /// Build the arena from a workflow definition
    ///
    /// Rejects definitions that do not validate or that contain cycles.
    pub fn build(workflow: &Workflow) -> Result<Self> {
        tracing::debug!("🏗️ Building execution graph for '{}'", workflow.id);
        workflow.validate()?;

        let mut graph = StableDiGraph::new();
        let mut node_id_to_index = HashMap::new();
        let mut declared = Vec::with_capacity(workflow.nodes.len());
        for node in &workflow.nodes {
            let index = graph.add_node(node.clone());
            node_id_to_index.insert(node.id.clone(), index);
            declared.push(index);
            tracing::debug!("  ➕ Added node: '{}' (type: {:?})", node.id, node.node_type);
        }

        let mut built = Self { graph, node_id_to_index, bindings: HashMap::new(), declared };
        for edge in &workflow.edges {
            built.connect(edge)?;
        }

        toposort(&built.graph, None)
            .map_err(|cycle| anyhow::anyhow!(
                "Workflow contains a cycle through '{}'; use a Cycle or Loop node instead",
                built.graph[cycle.node_id()].id
            ))?;

        Ok(built)
    }

    fn connect(&mut self, edge: &Edge) -> Result<()> {
        let from = self.lookup(&edge.from)
            .ok_or_else(|| anyhow::anyhow!("Edge source node not found: {}", edge.from))?;
        let to = self.lookup(&edge.to)
            .ok_or_else(|| anyhow::anyhow!("Edge target node not found: {}", edge.to))?;
        self.graph.add_edge(from, to, Link { output: edge.output, input: edge.input.clone() });
        tracing::debug!("  🔗 Added edge: {}[{}] -> {}.{}", edge.from, edge.output, edge.to, edge.input);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<NodeIndex> {
        self.node_id_to_index.get(id).copied()
    }

    pub fn node_at(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Declared nodes without outgoing edges, in declaration order
    pub fn sinks(&self) -> Vec<NodeIndex> {
        self.declared
            .iter()
            .copied()
            .filter(|&index| self.graph.edges_directed(index, Direction::Outgoing).next().is_none())
            .collect()
    }

    /// Linked inputs of a node
    pub fn inputs(&self, index: NodeIndex) -> Vec<Incoming> {
        let mut inputs: Vec<Incoming> = self.graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| Incoming {
                input: edge.weight().input.clone(),
                from: edge.source(),
                output: edge.weight().output,
            })
            .collect();
        inputs.sort_by(|a, b| a.input.cmp(&b.input));
        inputs
    }

    pub fn bindings(&self, index: NodeIndex) -> Option<&HashMap<String, Value>> {
        self.bindings.get(&index)
    }

    /// Append a loop expansion to the arena
    ///
    /// All fragment nodes must be new and every edge endpoint must exist once
    /// the fragment nodes are added.
    pub fn splice(&mut self, fragment: GraphFragment) -> Result<()> {
        for node in &fragment.nodes {
            if self.node_id_to_index.contains_key(&node.id) {
                return Err(anyhow::anyhow!("Expanded node '{}' already exists", node.id));
            }
        }
        for node in fragment.nodes {
            let id = node.id.clone();
            let index = self.graph.add_node(node);
            self.node_id_to_index.insert(id, index);
        }
        for edge in &fragment.edges {
            self.connect(edge)?;
        }
        for (id, values) in fragment.bindings {
            let index = self.lookup(&id)
                .ok_or_else(|| anyhow::anyhow!("Binding target node not found: {}", id))?;
            self.bindings.insert(index, values);
        }
        Ok(())
    }

    fn edges_of(&self, id: &str, direction: Direction) -> Vec<Edge> {
        let Some(index) = self.lookup(id) else { return Vec::new() };
        self.graph
            .edges_directed(index, direction)
            .map(|edge| Edge {
                from: self.graph[edge.source()].id.clone(),
                output: edge.weight().output,
                to: self.graph[edge.target()].id.clone(),
                input: edge.weight().input.clone(),
            })
            .collect()
    }
}

impl Topology for ExecutionGraph {
    fn node(&self, id: &str) -> Option<&Node> {
        self.lookup(id).map(|index| &self.graph[index])
    }

    fn incoming(&self, id: &str) -> Vec<Edge> {
        self.edges_of(id, Direction::Incoming)
    }

    fn outgoing(&self, id: &str) -> Vec<Edge> {
        self.edges_of(id, Direction::Outgoing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeType;
    use serde_json::json;

    fn chain() -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "chain".into(),
            nodes: vec![
                Node::new("a", NodeType::Constant, json!({"value": 1})),
                Node::new("b", NodeType::Formula, json!({"expression": "a + 1"})),
                Node::new("out", NodeType::Output, json!({})),
                Node::new("lone", NodeType::Constant, json!({})),
            ],
            edges: vec![Edge::new("a", 0, "b", "a"), Edge::new("b", 0, "out", "value")],
        }
    }

    #[test]
    fn sinks_follow_declaration_order() {
        let graph = ExecutionGraph::build(&chain()).unwrap();
        let sinks: Vec<&str> = graph.sinks().into_iter().map(|i| graph.node_at(i).id.as_str()).collect();
        assert_eq!(sinks, vec!["out", "lone"]);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut wf = chain();
        wf.edges.push(Edge::new("b", 0, "a", "value"));
        assert!(ExecutionGraph::build(&wf).is_err());
    }

    #[test]
    fn splice_appends_nodes_edges_and_bindings() {
        let mut graph = ExecutionGraph::build(&chain()).unwrap();
        let fragment = GraphFragment {
            nodes: vec![Node::new("b@1", NodeType::Formula, json!({}))],
            edges: vec![Edge::new("a", 0, "b@1", "a")],
            bindings: HashMap::from([("b@1".to_string(), HashMap::from([("c".to_string(), Value::Int(3))]))]),
        };
        graph.splice(fragment.clone()).unwrap();

        let clone = graph.lookup("b@1").unwrap();
        assert_eq!(graph.inputs(clone)[0].from, graph.lookup("a").unwrap());
        assert_eq!(graph.bindings(clone).unwrap()["c"], Value::Int(3));
        assert_eq!(graph.incoming("b@1"), vec![Edge::new("a", 0, "b@1", "a")]);
        assert_eq!(graph.sinks().len(), 2, "clones never become sinks");
        assert!(graph.splice(fragment).is_err());
    }
}

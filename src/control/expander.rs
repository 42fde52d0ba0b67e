/// Loop body discovery and cloning
///
/// The body of a loop is every node that lies on a path from the open marker
/// to the close marker: reachable forward from the open node and backward from
/// the close node. Each further iteration is a fresh copy of that set, wired
/// to the same outside inputs, with the copied open marker bound to the next
/// index and the current carried values. The expander never touches the graph
/// it reads; the host splices the returned fragment in.

use crate::control::loops::CARRIED_SLOTS;
use crate::control::ControlError;
use crate::eval::Value;
use crate::workflow::types::{base_id, Edge, Node, Workflow};
use std::collections::{HashMap, HashSet, VecDeque};

/// Read-only view of a graph the expander can walk
pub trait Topology {
    fn node(&self, id: &str) -> Option<&Node>;
    /// Edges ending at `id`
    fn incoming(&self, id: &str) -> Vec<Edge>;
    /// Edges starting at `id`
    fn outgoing(&self, id: &str) -> Vec<Edge>;
}

impl Topology for Workflow {
    fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn incoming(&self, id: &str) -> Vec<Edge> {
        self.edges.iter().filter(|e| e.to == id).cloned().collect()
    }

    fn outgoing(&self, id: &str) -> Vec<Edge> {
        self.edges.iter().filter(|e| e.from == id).cloned().collect()
    }
}

/// Nodes and edges to splice into a running graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphFragment {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Input values bound on fragment nodes, taking precedence over params
    /// Key: node id, Value: input name to value
    pub bindings: HashMap<String, HashMap<String, Value>>,
}

/// One cloned iteration
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub fragment: GraphFragment,
    /// Clone of the close marker whose outputs become the loop's outputs
    pub result_from: String,
    /// Clone of the open marker
    pub open_clone: String,
}

/// Open-marker inputs replaced by bindings on every clone
const REBOUND_INPUTS: [&str; 3] = ["index", "index_override", "loop_id"];

fn rebound(input: &str) -> bool {
    REBOUND_INPUTS.contains(&input) || CARRIED_SLOTS.contains(&input)
}

/// Id of the copy of `id` made in expansion `seq`
pub fn clone_id(id: &str, seq: u64) -> String {
    format!("{}@{}", base_id(id), seq)
}

/// Loop body between `open` and `close`, both included, in discovery order
pub fn discover_body(topology: &dyn Topology, open: &str, close: &str) -> Result<Vec<String>, ControlError> {
    let unpaired = |reason: &str| ControlError::UnpairedClose {
        open: open.to_string(),
        close: close.to_string(),
        reason: reason.to_string(),
    };
    if topology.node(open).is_none() {
        return Err(unpaired("open node does not exist"));
    }
    if topology.node(close).is_none() {
        return Err(unpaired("close node does not exist"));
    }

    let mut forward = vec![open.to_string()];
    let mut reachable: HashSet<String> = HashSet::from([open.to_string()]);
    let mut queue = VecDeque::from([open.to_string()]);
    while let Some(current) = queue.pop_front() {
        for edge in topology.outgoing(&current) {
            if reachable.insert(edge.to.clone()) {
                forward.push(edge.to.clone());
                queue.push_back(edge.to);
            }
        }
    }
    if !reachable.contains(close) {
        return Err(unpaired("close is not downstream of open"));
    }

    let mut body: HashSet<String> = HashSet::from([close.to_string()]);
    let mut queue = VecDeque::from([close.to_string()]);
    while let Some(current) = queue.pop_front() {
        if current == open {
            continue;
        }
        for edge in topology.incoming(&current) {
            if reachable.contains(&edge.from) && body.insert(edge.from.clone()) {
                queue.push_back(edge.from);
            }
        }
    }

    Ok(forward.into_iter().filter(|id| body.contains(id)).collect())
}

/// Clone the loop body for the iteration at `next_index`
///
/// Edges inside the body are copied between the clones. Edges entering the
/// body from outside are kept, pointing at the clones, except the open
/// marker's index, loop id and carried inputs, which are bound to the values
/// of this hand-off instead.
pub fn expand(
    topology: &dyn Topology,
    open: &str,
    close: &str,
    seq: u64,
    next_index: i64,
    loop_id: &str,
    carried: &[Value; 4],
) -> Result<Expansion, ControlError> {
    let body = discover_body(topology, open, close)?;
    let members: HashSet<&str> = body.iter().map(String::as_str).collect();
    let open_clone = clone_id(open, seq);

    let mut fragment = GraphFragment::default();
    for id in &body {
        let node = topology.node(id).ok_or_else(|| ControlError::UnpairedClose {
            open: open.to_string(),
            close: close.to_string(),
            reason: format!("body node '{}' vanished", id),
        })?;
        let clone = clone_id(id, seq);
        fragment.nodes.push(Node { id: clone.clone(), ..node.clone() });

        for edge in topology.incoming(id) {
            if id == open && rebound(&edge.input) {
                continue;
            }
            let from = if members.contains(edge.from.as_str()) { clone_id(&edge.from, seq) } else { edge.from };
            fragment.edges.push(Edge { from, to: clone.clone(), ..edge });
        }
    }

    let mut bound = HashMap::from([
        ("index".to_string(), Value::Int(next_index)),
        ("index_override".to_string(), Value::None),
        ("loop_id".to_string(), Value::str(loop_id)),
    ]);
    for (slot, value) in CARRIED_SLOTS.iter().zip(carried) {
        bound.insert((*slot).to_string(), value.clone());
    }
    fragment.bindings.insert(open_clone.clone(), bound);

    tracing::debug!("🧬 Cloned {} loop body nodes for iteration {} of '{}'", body.len(), next_index, loop_id);

    Ok(Expansion { fragment, result_from: clone_id(close, seq), open_clone })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeType;
    use serde_json::json;

    /// src -> open -> body -> close -> sink, with `side` feeding body from
    /// outside and `tap` hanging off the body without reaching close
    fn looped() -> Workflow {
        let node = |id: &str, t| Node::new(id, t, json!({}));
        Workflow {
            id: "wf".into(),
            name: "loop".into(),
            nodes: vec![
                node("src", NodeType::Constant),
                node("side", NodeType::Constant),
                node("open", NodeType::LoopOpen),
                node("body", NodeType::Formula),
                node("tap", NodeType::Output),
                node("close", NodeType::LoopClose),
                node("sink", NodeType::Output),
            ],
            edges: vec![
                Edge::new("src", 0, "open", "data"),
                Edge::new("side", 0, "open", "end"),
                Edge::new("open", 0, "close", "status"),
                Edge::new("open", 1, "body", "a"),
                Edge::new("side", 0, "body", "b"),
                Edge::new("body", 0, "tap", "value"),
                Edge::new("body", 0, "close", "data"),
                Edge::new("close", 0, "sink", "value"),
            ],
        }
    }

    #[test]
    fn body_is_between_open_and_close() {
        let body = discover_body(&looped(), "open", "close").unwrap();
        assert_eq!(body, vec!["open", "close", "body"]);
    }

    #[test]
    fn unreachable_close_is_unpaired() {
        let wf = looped();
        assert!(matches!(discover_body(&wf, "close", "open"), Err(ControlError::UnpairedClose { .. })));
        assert!(matches!(discover_body(&wf, "open", "nope"), Err(ControlError::UnpairedClose { .. })));
    }

    #[test]
    fn clone_rewires_inside_and_keeps_outside_inputs() {
        let carried = [Value::Int(7), Value::None, Value::None, Value::None];
        let expansion = expand(&looped(), "open", "close", 3, 1, "open", &carried).unwrap();
        assert_eq!(expansion.result_from, "close@3");
        assert_eq!(expansion.open_clone, "open@3");

        let ids: Vec<&str> = expansion.fragment.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["open@3", "close@3", "body@3"]);

        let edges = &expansion.fragment.edges;
        assert!(edges.contains(&Edge::new("side", 0, "open@3", "end")));
        assert!(edges.contains(&Edge::new("open@3", 0, "close@3", "status")));
        assert!(edges.contains(&Edge::new("open@3", 1, "body@3", "a")));
        assert!(edges.contains(&Edge::new("side", 0, "body@3", "b")));
        assert!(edges.contains(&Edge::new("body@3", 0, "close@3", "data")));
        assert!(!edges.iter().any(|e| e.input == "data" && e.to == "open@3"));
        assert!(!edges.iter().any(|e| e.to == "sink"));

        let bound = &expansion.fragment.bindings["open@3"];
        assert_eq!(bound["index"], Value::Int(1));
        assert_eq!(bound["data"], Value::Int(7));
        assert_eq!(bound["loop_id"], Value::str("open"));
    }

    #[test]
    fn clones_of_clones_keep_base_ids() {
        assert_eq!(clone_id("open@3", 4), "open@4");
    }

    #[test]
    fn expansion_leaves_source_untouched() {
        let wf = looped();
        let before = wf.clone();
        let carried = [Value::None, Value::None, Value::None, Value::None];
        expand(&wf, "open", "close", 1, 1, "open", &carried).unwrap();
        assert_eq!(wf, before);
    }
}

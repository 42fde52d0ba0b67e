/// Demand-driven execution engine
///
/// Builds a petgraph arena from the workflow and pulls every sink through an
/// explicit work stack: a node runs once all inputs it needs are available.
/// Loop expansions are spliced into the arena and scheduled before the node
/// that produced them completes.

use crate::control::{ControlError, LoopStatus};
use crate::eval::Value;
use crate::runtime::executor::{lazy_inputs, ChangeSignal, InputDemand, Inputs, NodeExecutor, NodeOutcome, RunState};
use crate::runtime::graph::ExecutionGraph;
use crate::workflow::types::{Node, NodeType, Workflow};
use anyhow::{Context, Result};
use petgraph::stable_graph::NodeIndex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Report of one workflow run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExecutionResult {
    pub workflow_id: String,
    /// Unique id of this run
    pub run_id: String,
    /// RFC 3339 start time
    pub started_at: String,
    /// Values recorded by Output nodes, by node id
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Nodes that did not run because an input was blocked
    pub blocked: Vec<String>,
    /// Nodes executed (cache hits excluded)
    pub executed: usize,
    /// Nodes whose outputs came from the output cache
    pub cached: usize,
    /// Loop bodies cloned and spliced into the graph
    ///
    /// The first iteration runs on the declared nodes, so a full loop over
    /// `start..=end` adds `end - start` here; see `iterations` for the
    /// `end - start + 1` body runs.
    pub expansions: usize,
    /// Body instantiations per loop id, the first one included
    pub iterations: BTreeMap<String, usize>,
    /// The run stopped early on an interrupt
    pub interrupted: bool,
}

/// Cached outputs of pure nodes
/// Key: node id, Value: (input fingerprint, outputs)
pub type OutputCache = HashMap<String, (String, Vec<Value>)>;

/// Settled result of a node within one run
#[derive(Debug, Clone)]
enum Slot {
    Done(Vec<Value>),
    Blocked,
}

#[derive(Debug)]
enum Stage {
    /// Eager inputs not yet gathered
    Start,
    /// Lazy inputs decided; waiting for them, then run
    Ready(InputDemand),
    /// Expanded; adopts the outputs of the given node
    Awaiting(NodeIndex),
}

#[derive(Debug)]
struct Frame {
    node: NodeIndex,
    stage: Stage,
}

impl Frame {
    fn new(node: NodeIndex) -> Self {
        Self { node, stage: Stage::Start }
    }
}

enum Gathered {
    Pending(Vec<NodeIndex>),
    Blocked,
    Ready(Vec<(String, Value)>),
}

/// Execution engine running one workflow at a time
#[derive(Debug)]
pub struct ExecutionEngine {
    /// Node executor for handling individual node execution
    executor: Arc<NodeExecutor>,
    /// Cap on loop expansions in a single run
    max_expansions: usize,
}

impl ExecutionEngine {
    pub fn new(executor: Arc<NodeExecutor>, max_expansions: usize) -> Self {
        Self { executor, max_expansions }
    }

    pub fn executor(&self) -> &Arc<NodeExecutor> {
        &self.executor
    }

    /// Execute a workflow to completion, interruption or failure
    ///
    /// Every sink of the declared graph is demanded in declaration order.
    /// `state` and `cache` are mutated in place; callers that need the run to
    /// be all-or-nothing pass copies.
    pub fn execute_workflow(
        &self,
        workflow: &Workflow,
        state: &mut RunState,
        cache: &mut OutputCache,
        interrupt: &AtomicBool,
    ) -> Result<ExecutionResult> {
        let started = std::time::Instant::now();
        tracing::info!("🚀 Starting workflow execution: {}", workflow.id);

        let mut graph = ExecutionGraph::build(workflow)?;
        let mut slots: HashMap<NodeIndex, Slot> = HashMap::new();
        let mut report = ExecutionResult {
            workflow_id: workflow.id.clone(),
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        };

        for sink in graph.sinks() {
            let mut stack = vec![Frame::new(sink)];
            while let Some(frame) = stack.pop() {
                if interrupt.load(Ordering::SeqCst) {
                    tracing::warn!("⏸️ Workflow '{}' interrupted after {} nodes", workflow.id, report.executed);
                    report.interrupted = true;
                    return Ok(report);
                }
                if slots.contains_key(&frame.node) {
                    continue;
                }

                let index = frame.node;
                match frame.stage {
                    Stage::Start => {
                        let node = graph.node_at(index);
                        let linked = match gather(&graph, &slots, index, None) {
                            Gathered::Pending(missing) => {
                                stack.push(Frame::new(index));
                                stack.extend(missing.into_iter().map(Frame::new));
                                continue;
                            }
                            Gathered::Blocked => {
                                block(&mut slots, &mut report, index, node);
                                continue;
                            }
                            Gathered::Ready(linked) => linked,
                        };
                        let inputs = resolve(node, graph.bindings(index), linked);
                        let demand = self.executor
                            .required_inputs(node, &inputs, state)
                            .with_context(|| format!("Node execution failed for '{}'", node.id))?;
                        stack.push(Frame { node: index, stage: Stage::Ready(demand) });
                    }
                    Stage::Ready(demand) => {
                        let node = graph.node_at(index).clone();
                        let linked = match gather(&graph, &slots, index, Some(&demand)) {
                            Gathered::Pending(missing) => {
                                stack.push(Frame { node: index, stage: Stage::Ready(demand) });
                                stack.extend(missing.into_iter().map(Frame::new));
                                continue;
                            }
                            Gathered::Blocked => {
                                block(&mut slots, &mut report, index, &node);
                                continue;
                            }
                            Gathered::Ready(linked) => linked,
                        };
                        let inputs = resolve(&node, graph.bindings(index), linked);

                        let signal = self.executor.change_signal(&node, &inputs);
                        if let ChangeSignal::Fingerprint(fingerprint) = &signal {
                            if let Some((cached, outputs)) = cache.get(&node.id) {
                                if cached == fingerprint {
                                    tracing::debug!("♻️ Reusing cached outputs of '{}'", node.id);
                                    slots.insert(index, Slot::Done(outputs.clone()));
                                    report.cached += 1;
                                    continue;
                                }
                            }
                        }

                        tracing::debug!("📍 Executing node '{}' (type: {:?})", node.id, node.node_type);
                        let outcome = self.executor
                            .execute(&node, &inputs, demand.decision, state, &graph)
                            .with_context(|| format!("Node execution failed for '{}'", node.id))?;
                        report.executed += 1;

                        match outcome {
                            NodeOutcome::Values(values) => {
                                record(&mut report, &node, &inputs, &values);
                                if let ChangeSignal::Fingerprint(fingerprint) = signal {
                                    cache.insert(node.id.clone(), (fingerprint, values.clone()));
                                }
                                slots.insert(index, Slot::Done(values));
                            }
                            NodeOutcome::Blocked => block(&mut slots, &mut report, index, &node),
                            NodeOutcome::Interrupt => {
                                tracing::warn!("🛑 Workflow '{}' halted by node '{}'", workflow.id, node.id);
                                report.interrupted = true;
                                return Ok(report);
                            }
                            NodeOutcome::Expand { fragment, result_from } => {
                                if state.expansions as usize >= self.max_expansions {
                                    return Err(ControlError::ExpansionLimit(self.max_expansions))
                                        .with_context(|| format!("Node execution failed for '{}'", node.id));
                                }
                                graph.splice(fragment)?;
                                state.expansions += 1;
                                report.expansions += 1;
                                let target = graph.lookup(&result_from)
                                    .ok_or_else(|| anyhow::anyhow!("Expansion result node not found: {}", result_from))?;
                                tracing::debug!("🧩 '{}' expanded; awaiting '{}'", node.id, result_from);
                                stack.push(Frame { node: index, stage: Stage::Awaiting(target) });
                                stack.push(Frame::new(target));
                            }
                        }
                    }
                    Stage::Awaiting(target) => {
                        let adopted = slots.get(&target).cloned()
                            .ok_or_else(|| anyhow::anyhow!("Expansion result '{}' never settled", graph.node_at(target).id))?;
                        if matches!(adopted, Slot::Blocked) {
                            report.blocked.push(graph.node_at(index).id.clone());
                        }
                        slots.insert(index, adopted);
                    }
                }
            }
        }

        tracing::info!(
            "🎉 Workflow '{}' completed in {:?}: {} executed, {} cached, {} expansions, {} blocked",
            workflow.id, started.elapsed(), report.executed, report.cached, report.expansions, report.blocked.len()
        );
        Ok(report)
    }
}

/// Linked input values of `index`, or what is still missing
///
/// Lazy inputs are only gathered once `demand` names them.
fn gather(
    graph: &ExecutionGraph,
    slots: &HashMap<NodeIndex, Slot>,
    index: NodeIndex,
    demand: Option<&InputDemand>,
) -> Gathered {
    let lazy = lazy_inputs(graph.node_at(index).node_type);
    let wanted = |input: &str| {
        !lazy.contains(&input) || demand.is_some_and(|d| d.lazy.contains(&input))
    };

    let mut missing = Vec::new();
    let mut linked = Vec::new();
    for incoming in graph.inputs(index).into_iter().filter(|i| wanted(i.input.as_str())) {
        match slots.get(&incoming.from) {
            None => missing.push(incoming.from),
            Some(Slot::Blocked) => return Gathered::Blocked,
            Some(Slot::Done(values)) => {
                let value = values.get(incoming.output).cloned().unwrap_or(Value::None);
                linked.push((incoming.input, value));
            }
        }
    }
    if missing.is_empty() {
        Gathered::Ready(linked)
    } else {
        Gathered::Pending(missing)
    }
}

/// Params, then loop bindings, then linked values
fn resolve(node: &Node, bindings: Option<&HashMap<String, Value>>, linked: Vec<(String, Value)>) -> Inputs {
    let mut inputs = Inputs::new();
    if let Some(params) = node.params.as_object() {
        for (name, value) in params {
            inputs.insert(name.clone(), Value::from(value));
        }
    }
    if let Some(bound) = bindings {
        inputs.extend(bound.iter().map(|(name, value)| (name.clone(), value.clone())));
    }
    inputs.extend(linked);
    inputs
}

fn block(slots: &mut HashMap<NodeIndex, Slot>, report: &mut ExecutionResult, index: NodeIndex, node: &Node) {
    tracing::debug!("⛔ Node '{}' blocked", node.id);
    slots.insert(index, Slot::Blocked);
    report.blocked.push(node.id.clone());
}

/// Report bookkeeping for nodes that produced values
fn record(report: &mut ExecutionResult, node: &Node, inputs: &Inputs, values: &[Value]) {
    match node.node_type {
        NodeType::Output => {
            let value = inputs.get("value").map_or(serde_json::Value::Null, Value::to_json);
            report.outputs.insert(node.id.clone(), value);
        }
        NodeType::LoopOpen => {
            if let Some(status) = values.first().and_then(|v| LoopStatus::from_value(v, &node.id).ok()) {
                *report.iterations.entry(status.loop_id).or_default() += 1;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Evaluator;
    use crate::workflow::types::Edge;
    use serde_json::json;

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(NodeExecutor::new(Arc::new(Evaluator::default()))), 100)
    }

    fn run(workflow: &Workflow) -> Result<ExecutionResult> {
        let mut state = RunState::new(workflow.id.as_str(), Default::default(), Default::default());
        engine().execute_workflow(workflow, &mut state, &mut OutputCache::new(), &AtomicBool::new(false))
    }

    fn workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow { id: "wf".into(), name: "test".into(), nodes, edges }
    }

    #[test]
    fn values_flow_along_links() {
        let wf = workflow(
            vec![
                Node::new("c", NodeType::Constant, json!({"value": 20})),
                Node::new("f", NodeType::Formula, json!({"expression": "a + 1"})),
                Node::new("out", NodeType::Output, json!({})),
            ],
            vec![Edge::new("c", 0, "f", "a"), Edge::new("f", 0, "out", "value")],
        );
        let report = run(&wf).unwrap();
        assert_eq!(report.outputs["out"], json!(21));
        assert_eq!(report.executed, 3);
    }

    #[test]
    fn unchosen_branch_never_runs() {
        let wf = workflow(
            vec![
                Node::new("yes", NodeType::Constant, json!({"value": "yes"})),
                Node::new("boom", NodeType::Formula, json!({"expression": "1 / 0"})),
                Node::new("if", NodeType::IfCondition, json!({"a": 1, "b": 2, "condition": "A < B"})),
                Node::new("out", NodeType::Output, json!({})),
            ],
            vec![
                Edge::new("yes", 0, "if", "if_true"),
                Edge::new("boom", 0, "if", "if_false"),
                Edge::new("if", 0, "out", "value"),
            ],
        );
        let report = run(&wf).unwrap();
        assert_eq!(report.outputs["out"], json!("yes"));
    }

    #[test]
    fn failures_name_the_node() {
        let wf = workflow(vec![Node::new("bad", NodeType::Formula, json!({"expression": "nope"}))], vec![]);
        let err = run(&wf).unwrap_err();
        assert!(format!("{:#}", err).contains("'bad'"));
        assert!(format!("{:#}", err).contains("NameError"));
    }

    #[test]
    fn preset_interrupt_stops_before_any_node() {
        let wf = workflow(vec![Node::new("c", NodeType::Constant, json!({"value": 1}))], vec![]);
        let mut state = RunState::default();
        let report = engine()
            .execute_workflow(&wf, &mut state, &mut OutputCache::new(), &AtomicBool::new(true))
            .unwrap();
        assert!(report.interrupted);
        assert_eq!(report.executed, 0);
    }

    #[test]
    fn pure_nodes_are_served_from_cache() {
        let wf = workflow(
            vec![
                Node::new("c", NodeType::Constant, json!({"value": 1})),
                Node::new("out", NodeType::Output, json!({})),
            ],
            vec![Edge::new("c", 0, "out", "value")],
        );
        let mut cache = OutputCache::new();
        let mut state = RunState::default();
        let first = engine().execute_workflow(&wf, &mut state, &mut cache, &AtomicBool::new(false)).unwrap();
        let second = engine().execute_workflow(&wf, &mut state, &mut cache, &AtomicBool::new(false)).unwrap();
        assert_eq!((first.executed, first.cached), (2, 0));
        assert_eq!((second.executed, second.cached), (1, 1));
        assert_eq!(second.outputs["out"], json!(1));
    }
}

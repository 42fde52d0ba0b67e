/// Node execution handlers
///
/// This module contains the execution logic for each node type:
/// - Constant / Output: literal sources and report sinks
/// - Formula / IfCondition: restricted evaluator and comparisons
/// - MemoryStorage: variable store writes
/// - Halt: run interruption
/// - Cycle / CycleContinue / CycleEnd: cross-run cycle state machine
/// - LoopOpen / LoopClose: intra-run loop protocol and body expansion
///
/// Every handler receives its inputs already resolved by the engine: linked
/// values override loop bindings, which override literal params.

use crate::control::cycle::Advance;
use crate::control::loops::{self, CloseOutcome, OpenOutcome, CARRIED_SLOTS};
use crate::control::{expander, ControlError, CycleKey, CycleParams, CycleRegistry, GraphFragment, LoopStatus, Topology};
use crate::eval::builtins::iterate;
use crate::eval::ops;
use crate::eval::ast::{BinOp, CmpOp};
use crate::eval::{cbool, cfloat, cint, Environment, Evaluator, Value};
use crate::memory::VariableStore;
use crate::runtime::graph::ExecutionGraph;
use crate::workflow::types::{Node, NodeType};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolved input values of a node, by input name
pub type Inputs = HashMap<String, Value>;

/// What a node asks the host to do after it ran
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Plain outputs, one per output slot
    Values(Vec<Value>),
    /// Nothing downstream of this node may run
    Blocked,
    /// Splice `fragment` in, run `result_from`, and adopt its outputs
    Expand { fragment: GraphFragment, result_from: String },
    /// Stop the whole run without error
    Interrupt,
}

/// Whether cached outputs of a node may be reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSignal {
    /// Always re-run
    Always,
    /// Reuse outputs cached under the same fingerprint
    Fingerprint(String),
}

/// Answer to the lazy-input query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputDemand {
    /// Lazy inputs that must be materialised before execution
    pub lazy: Vec<&'static str>,
    /// Decision reached while answering, handed back to `execute`
    pub decision: Option<bool>,
}

/// Host features the control nodes depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Blocked outcomes stop everything downstream
    pub blocking: bool,
    /// Expand outcomes are spliced and scheduled
    pub expansion: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self { blocking: true, expansion: true }
    }
}

/// Mutable state a run works on
///
/// The session hands the engine a copy and keeps it only when the run ends
/// without error.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub workflow_id: String,
    /// Process-wide variable store
    pub variables: VariableStore,
    /// Cross-run cycle states
    pub cycles: CycleRegistry,
    /// Loop expansions spliced so far; also numbers clone ids
    pub expansions: u64,
}

impl RunState {
    pub fn new(workflow_id: impl Into<String>, variables: VariableStore, cycles: CycleRegistry) -> Self {
        Self { workflow_id: workflow_id.into(), variables, cycles, expansions: 0 }
    }
}

/// Inputs a node type only materialises on demand
pub fn lazy_inputs(node_type: NodeType) -> &'static [&'static str] {
    match node_type {
        NodeType::LoopOpen => &CARRIED_SLOTS,
        NodeType::IfCondition => &["if_true", "if_false"],
        _ => &[],
    }
}

/// Node executor that handles execution of different node types
///
/// Holds the shared evaluator and dispatches to the appropriate handler
/// based on node type.
#[derive(Debug)]
pub struct NodeExecutor {
    evaluator: Arc<Evaluator>,
    capabilities: HostCapabilities,
}

impl NodeExecutor {
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self { evaluator, capabilities: HostCapabilities::default() }
    }

    /// Executor for a host lacking some capabilities
    pub fn with_capabilities(evaluator: Arc<Evaluator>, capabilities: HostCapabilities) -> Self {
        Self { evaluator, capabilities }
    }

    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    /// Which lazy inputs `node` needs this time
    ///
    /// `inputs` holds everything except the lazy inputs.
    pub fn required_inputs(&self, node: &Node, inputs: &Inputs, state: &RunState) -> Result<InputDemand> {
        match node.node_type {
            NodeType::LoopOpen => {
                let status = loop_status(node, inputs)?;
                let env = status.environment(&state.variables.snapshot(), None);
                let condition = loops::test_condition(&self.evaluator, &node.id, &text(inputs, "condition"), &env)?;
                let lazy = if condition { CARRIED_SLOTS.to_vec() } else { Vec::new() };
                Ok(InputDemand { lazy, decision: Some(condition) })
            }
            NodeType::IfCondition => {
                let decision = self.if_condition(node, inputs, state)?;
                let lazy = vec![if decision { "if_true" } else { "if_false" }];
                Ok(InputDemand { lazy, decision: Some(decision) })
            }
            _ => Ok(InputDemand::default()),
        }
    }

    /// Whether the outputs of `node` for these inputs may come from cache
    ///
    /// Only nodes whose outputs depend on nothing but their inputs qualify; an
    /// `expression` condition reads the Variable Store.
    pub fn change_signal(&self, node: &Node, inputs: &Inputs) -> ChangeSignal {
        match node.node_type {
            NodeType::Constant => ChangeSignal::Fingerprint(fingerprint(node, inputs)),
            NodeType::IfCondition if text(inputs, "condition") != "expression" => {
                ChangeSignal::Fingerprint(fingerprint(node, inputs))
            }
            _ => ChangeSignal::Always,
        }
    }

    /// Execute a single node with its resolved inputs
    ///
    /// `decision` is whatever `required_inputs` decided for this node.
    pub fn execute(
        &self,
        node: &Node,
        inputs: &Inputs,
        decision: Option<bool>,
        state: &mut RunState,
        graph: &ExecutionGraph,
    ) -> Result<NodeOutcome> {
        tracing::debug!("🚀 Executing node: {} (type: {:?})", node.id, node.node_type);
        let outcome = match node.node_type {
            NodeType::Constant => Ok(NodeOutcome::Values(vec![take(inputs, "value")])),
            NodeType::Output => Ok(NodeOutcome::Values(Vec::new())),
            NodeType::Formula => self.execute_formula(node, inputs, state),
            NodeType::MemoryStorage => self.execute_memory_storage(node, inputs, state),
            NodeType::IfCondition => {
                let decision = match decision {
                    Some(decision) => decision,
                    None => self.if_condition(node, inputs, state)?,
                };
                let branch = if decision { "if_true" } else { "if_false" };
                Ok(NodeOutcome::Values(vec![take(inputs, branch)]))
            }
            NodeType::Halt => self.execute_halt(node, inputs),
            NodeType::Cycle => self.execute_cycle(node, inputs, state),
            NodeType::CycleContinue => self.execute_cycle_continue(node, inputs, state),
            NodeType::CycleEnd => self.execute_cycle_end(node, inputs, state),
            NodeType::LoopOpen => self.execute_loop_open(node, inputs, decision, state),
            NodeType::LoopClose => self.execute_loop_close(node, inputs, state, graph),
        };

        match &outcome {
            Ok(NodeOutcome::Values(values)) => {
                tracing::debug!("📤 Node {} produced {} outputs", node.id, values.len());
            }
            Ok(other) => tracing::debug!("📤 Node {} returned {:?}", node.id, outcome_name(other)),
            Err(e) => tracing::error!("❌ Node execution failed: {} - Error: {}", node.id, e),
        }
        outcome
    }

    /// Formula node
    ///
    /// Evaluates `expression` against the variable store plus `a`, `b`, `c`,
    /// converts the result to `output_type`, and with `persist` commits the
    /// program's assignments to the store once everything succeeded.
    fn execute_formula(&self, node: &Node, inputs: &Inputs, state: &mut RunState) -> Result<NodeOutcome> {
        let expression = text(inputs, "expression");
        if expression.trim().is_empty() {
            return Ok(NodeOutcome::Values(vec![Value::None]));
        }

        let mut env = state.variables.snapshot();
        for name in ["a", "b", "c"] {
            env.insert(name.to_string(), take(inputs, name));
        }
        let execution = self.evaluator
            .execute(&expression, &env)
            .map_err(|source| ControlError::Evaluation { node: node.id.clone(), source })?;

        let output_type = text(inputs, "output_type");
        let value = convert_output(execution.value, &output_type)?;

        if flag(inputs, "persist", false)? {
            for (name, value) in execution.locals {
                tracing::debug!("💾 Formula {} persisted '{}'", node.id, name);
                state.variables.set(name, value);
            }
        }
        Ok(NodeOutcome::Values(vec![value]))
    }

    /// Memory storage node: named store write on behalf of this node
    fn execute_memory_storage(&self, node: &Node, inputs: &Inputs, state: &mut RunState) -> Result<NodeOutcome> {
        let name = text(inputs, "name");
        if name.is_empty() {
            return Err(anyhow::anyhow!("MemoryStorage node '{}' requires a name", node.id));
        }

        let writer = node.base_id();
        if flag(inputs, "reset", false)? {
            tracing::info!("🧹 Memory '{}' reset by {}", name, writer);
            state.variables.reset_writer(writer, &name);
            return Ok(NodeOutcome::Values(vec![Value::None]));
        }

        let value = match inputs.get("input") {
            None | Some(Value::None) => None,
            Some(value) => Some(value.clone()),
        };
        let current = state.variables.store(writer, &name, value);
        Ok(NodeOutcome::Values(vec![current.unwrap_or(Value::None)]))
    }

    fn execute_halt(&self, node: &Node, inputs: &Inputs) -> Result<NodeOutcome> {
        let input = take(inputs, "input");
        if !flag(inputs, "disable", false)? && !input.is_none() {
            tracing::warn!("🛑 Halt node {} interrupted the run", node.id);
            return Ok(NodeOutcome::Interrupt);
        }
        Ok(NodeOutcome::Values(vec![input]))
    }

    fn execute_cycle(&self, node: &Node, inputs: &Inputs, state: &mut RunState) -> Result<NodeOutcome> {
        let defaults = CycleParams::default();
        let params = CycleParams {
            start: int(inputs, "start", defaults.start)?,
            step: int(inputs, "step", defaults.step)?,
            end: int(inputs, "end", defaults.end)?,
            manual_reset: flag(inputs, "manual_reset", defaults.manual_reset)?,
            auto_reset: flag(inputs, "auto_reset", defaults.auto_reset)?,
        };
        let key = CycleKey::new(state.workflow_id.as_str(), node.base_id());
        let (cycle, dry_run) = state.cycles.begin(&key, &params);
        Ok(NodeOutcome::Values(vec![key.to_handle(&cycle), Value::Bool(dry_run)]))
    }

    fn execute_cycle_continue(&self, node: &Node, inputs: &Inputs, state: &mut RunState) -> Result<NodeOutcome> {
        let key = cycle_key(node, inputs)?;
        let index_override = optional_int(inputs, "index_override")?;
        let forwarded = state.cycles.forward(&key, take(inputs, "data"), take(inputs, "aux"), index_override)?;
        Ok(NodeOutcome::Values(vec![
            forwarded.data,
            forwarded.aux,
            forwarded.index.map_or(Value::None, Value::Int),
        ]))
    }

    fn execute_cycle_end(&self, node: &Node, inputs: &Inputs, state: &mut RunState) -> Result<NodeOutcome> {
        let key = cycle_key(node, inputs)?;
        let outputs = match state.cycles.advance(&key, take(inputs, "data"), take(inputs, "aux"))? {
            Advance::DryRun => vec![Value::None, Value::None],
            Advance::Step { index, finished } => vec![Value::Int(index), Value::Bool(finished)],
        };
        Ok(NodeOutcome::Values(outputs))
    }

    fn execute_loop_open(
        &self,
        node: &Node,
        inputs: &Inputs,
        decision: Option<bool>,
        state: &RunState,
    ) -> Result<NodeOutcome> {
        if !self.capabilities.blocking {
            return Err(ControlError::UnsupportedCapability("execution blocking, required by LoopOpen").into());
        }
        let status = loop_status(node, inputs)?;
        let condition = match decision {
            Some(condition) => condition,
            None => {
                let env = status.environment(&state.variables.snapshot(), None);
                loops::test_condition(&self.evaluator, &node.id, &text(inputs, "condition"), &env)?
            }
        };

        match loops::open(status, condition) {
            OpenOutcome::Blocked(status) => {
                tracing::info!("⛔ Loop '{}' blocked at index {}", status.loop_id, status.index);
                Ok(NodeOutcome::Blocked)
            }
            OpenOutcome::Open(status) => {
                tracing::debug!("🔄 Loop '{}' iteration {} opened at {}", status.loop_id, status.index, node.id);
                let mut outputs = vec![status.to_value()];
                outputs.extend(CARRIED_SLOTS.iter().map(|slot| take(inputs, slot)));
                outputs.push(Value::Int(status.index));
                Ok(NodeOutcome::Values(outputs))
            }
        }
    }

    fn execute_loop_close(
        &self,
        node: &Node,
        inputs: &Inputs,
        state: &RunState,
        graph: &ExecutionGraph,
    ) -> Result<NodeOutcome> {
        if !self.capabilities.expansion {
            return Err(ControlError::UnsupportedCapability("graph expansion, required by LoopClose").into());
        }
        let mut status = LoopStatus::from_value(&take(inputs, "status"), &node.id)?;
        let paired = graph.node(&status.iteration_node_id).map(|open| open.node_type);
        if paired != Some(NodeType::LoopOpen) {
            return Err(ControlError::UnpairedClose {
                open: status.iteration_node_id.clone(),
                close: node.id.clone(),
                reason: "status does not come from a LoopOpen node".to_string(),
            }.into());
        }

        let carried: [Value; 4] = CARRIED_SLOTS.map(|slot| take(inputs, slot));
        let env = status.environment(&state.variables.snapshot(), Some(&carried));
        let condition = loops::test_condition(&self.evaluator, &node.id, &text(inputs, "condition"), &env)?;

        match loops::close(&mut status, condition) {
            CloseOutcome::Finished => {
                tracing::info!("🏁 Loop '{}' finished at index {}", status.loop_id, status.index);
                Ok(NodeOutcome::Values(carried.to_vec()))
            }
            CloseOutcome::Continue { next_index } => {
                let expansion = expander::expand(
                    graph,
                    &status.iteration_node_id,
                    &node.id,
                    state.expansions + 1,
                    next_index,
                    &status.loop_id,
                    &carried,
                )?;
                Ok(NodeOutcome::Expand { fragment: expansion.fragment, result_from: expansion.result_from })
            }
        }
    }

    /// Comparison of an IfCondition node
    fn if_condition(&self, node: &Node, inputs: &Inputs, state: &RunState) -> Result<bool> {
        let (mut a, mut b) = (take(inputs, "a"), take(inputs, "b"));
        match text(inputs, "comparison").as_str() {
            "" | "Values" => {}
            "Length(A)|Value(B)" => a = Value::Int(length(&a)?),
            "Length (Both)" => {
                a = Value::Int(length(&a)?);
                b = Value::Int(length(&b)?);
            }
            other => return Err(anyhow::anyhow!("Unknown comparison type '{}' on node {}", other, node.id)),
        }

        let evaluated = |op: CmpOp| ops::compare(op, &a, &b);
        let bitwise = |op: BinOp| ops::binary(op, &a, &b, self.evaluator.limits().max_len).map(|v| v.truthy());
        let condition = text(inputs, "condition");
        let result = match condition.as_str() {
            "A is TRUE" => Ok(a.truthy()),
            "B is TRUE" => Ok(b.truthy()),
            "A is NONE" => Ok(a.is_none()),
            "B is NONE" => Ok(b.is_none()),
            "A == B" => evaluated(CmpOp::Eq),
            "A != B" => evaluated(CmpOp::NotEq),
            "A > B" => evaluated(CmpOp::Gt),
            "A >= B" => evaluated(CmpOp::GtE),
            "A < B" => evaluated(CmpOp::Lt),
            "A <= B" => evaluated(CmpOp::LtE),
            "A is B" => evaluated(CmpOp::Is),
            "A is not B" => evaluated(CmpOp::IsNot),
            "A in B" => evaluated(CmpOp::In),
            "B in A" => ops::compare(CmpOp::In, &b, &a),
            "A & B" => bitwise(BinOp::BitAnd),
            "A | B" => bitwise(BinOp::BitOr),
            "A ^ B" => bitwise(BinOp::BitXor),
            "expression" => {
                let mut env: Environment = state.variables.snapshot();
                env.insert("A".into(), a.clone());
                env.insert("B".into(), b.clone());
                self.evaluator.evaluate(&text(inputs, "expression"), &env).map(|v| v.truthy())
            }
            other => return Err(anyhow::anyhow!("Unknown condition '{}' on node {}", other, node.id)),
        }
        .map_err(|source| ControlError::Evaluation { node: node.id.clone(), source })?;

        Ok(result != flag(inputs, "invert", false)?)
    }
}

/// Loop status an open node computes from its inputs
fn loop_status(node: &Node, inputs: &Inputs) -> Result<LoopStatus> {
    let start = int(inputs, "start", 0)?;
    let step = int(inputs, "step", 1)?;
    let end = int(inputs, "end", 10)?;
    let index = loops::resolve_index(optional_int(inputs, "index")?, optional_int(inputs, "index_override")?, start);
    let loop_id = match text(inputs, "loop_id") {
        id if id.is_empty() => node.id.clone(),
        id => id,
    };
    Ok(LoopStatus::new(loop_id, node.id.as_str(), start, step, end, index))
}

fn cycle_key(node: &Node, inputs: &Inputs) -> Result<CycleKey> {
    inputs
        .get("cycle")
        .and_then(CycleKey::from_handle)
        .ok_or_else(|| ControlError::MissingCycleState(node.id.clone()).into())
}

/// Convert a formula result to the requested output type
fn convert_output(value: Value, output_type: &str) -> Result<Value> {
    let converted = match output_type.to_uppercase().as_str() {
        "" | "ANY" => value,
        "INT" => Value::Int(cint(&value)?),
        "FLOAT" => Value::Float(cfloat(&value)?),
        "BOOLEAN" => Value::Bool(cbool(&value)?),
        "STRING" => Value::Str(value.to_string()),
        "LIST" => Value::List(iterate(&value)?),
        "TUPLE" => Value::Tuple(iterate(&value)?),
        "JSON" => match &value {
            Value::Str(s) => Value::from(serde_json::from_str::<serde_json::Value>(s)?),
            _ => value,
        },
        other => return Err(anyhow::anyhow!("Unknown output type '{}'", other)),
    };
    Ok(converted)
}

fn length(value: &Value) -> Result<i64> {
    match value {
        Value::Str(s) => Ok(s.chars().count() as i64),
        Value::List(items) | Value::Tuple(items) => Ok(items.len() as i64),
        Value::Dict(d) => Ok(d.len() as i64),
        other => Err(anyhow::anyhow!("object of type '{}' has no len()", other.type_name())),
    }
}

fn take(inputs: &Inputs, name: &str) -> Value {
    inputs.get(name).cloned().unwrap_or(Value::None)
}

fn text(inputs: &Inputs, name: &str) -> String {
    match inputs.get(name) {
        None | Some(Value::None) => String::new(),
        Some(Value::Str(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn int(inputs: &Inputs, name: &str, default: i64) -> Result<i64> {
    Ok(optional_int(inputs, name)?.unwrap_or(default))
}

fn optional_int(inputs: &Inputs, name: &str) -> Result<Option<i64>> {
    match inputs.get(name) {
        None | Some(Value::None) => Ok(None),
        Some(value) => Ok(Some(cint(value)?)),
    }
}

fn flag(inputs: &Inputs, name: &str, default: bool) -> Result<bool> {
    match inputs.get(name) {
        None | Some(Value::None) => Ok(default),
        Some(value) => Ok(cbool(value)?),
    }
}

/// Stable rendering of a node's inputs for the output cache
fn fingerprint(node: &Node, inputs: &Inputs) -> String {
    let mut names: Vec<&String> = inputs.keys().collect();
    names.sort();
    let mut rendered = format!("{:?}", node.node_type);
    for name in names {
        rendered.push_str(&format!(";{}={}", name, inputs[name].repr()));
    }
    rendered
}

fn outcome_name(outcome: &NodeOutcome) -> &'static str {
    match outcome {
        NodeOutcome::Values(_) => "values",
        NodeOutcome::Blocked => "blocked",
        NodeOutcome::Expand { .. } => "expand",
        NodeOutcome::Interrupt => "interrupt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Edge, Workflow};
    use serde_json::json;

    fn executor() -> NodeExecutor {
        NodeExecutor::new(Arc::new(Evaluator::default()))
    }

    fn inputs(pairs: &[(&str, Value)]) -> Inputs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn empty_graph() -> ExecutionGraph {
        ExecutionGraph::build(&Workflow { id: "wf".into(), name: "t".into(), nodes: vec![], edges: vec![] }).unwrap()
    }

    fn run(node: &Node, inputs: &Inputs, state: &mut RunState) -> Result<NodeOutcome> {
        executor().execute(node, inputs, None, state, &empty_graph())
    }

    #[test]
    fn formula_converts_and_persists() {
        let node = Node::new("f", NodeType::Formula, json!({}));
        let mut state = RunState::default();
        state.variables.set("base", Value::Int(10));
        let ins = inputs(&[
            ("expression", Value::str("total = base + a; total / 4")),
            ("a", Value::Int(4)),
            ("output_type", Value::str("INT")),
            ("persist", Value::Bool(true)),
        ]);
        assert_eq!(run(&node, &ins, &mut state).unwrap(), NodeOutcome::Values(vec![Value::Int(4)]));
        assert_eq!(state.variables.get("total"), Some(&Value::Int(14)));
    }

    #[test]
    fn failed_formula_persists_nothing() {
        let node = Node::new("f", NodeType::Formula, json!({}));
        let mut state = RunState::default();
        let ins = inputs(&[
            ("expression", Value::str("x = 1; y = undefined")),
            ("persist", Value::Bool(true)),
        ]);
        assert!(run(&node, &ins, &mut state).is_err());
        assert!(state.variables.is_empty());
    }

    #[test]
    fn formula_json_output_parses_strings() {
        let node = Node::new("f", NodeType::Formula, json!({}));
        let ins = inputs(&[
            ("expression", Value::str("'{\"k\": [1, 2]}'")),
            ("output_type", Value::str("JSON")),
        ]);
        let NodeOutcome::Values(values) = run(&node, &ins, &mut RunState::default()).unwrap() else {
            panic!("expected values");
        };
        assert_eq!(values[0].to_json(), json!({"k": [1, 2]}));
    }

    #[test]
    fn memory_storage_keeps_value_on_absent_input() {
        let node = Node::new("mem", NodeType::MemoryStorage, json!({}));
        let mut state = RunState::default();
        run(&node, &inputs(&[("name", Value::str("A")), ("input", Value::Int(1))]), &mut state).unwrap();
        let kept = run(&node, &inputs(&[("name", Value::str("A"))]), &mut state).unwrap();
        assert_eq!(kept, NodeOutcome::Values(vec![Value::Int(1)]));

        let moved = run(&node, &inputs(&[("name", Value::str("B"))]), &mut state).unwrap();
        assert_eq!(moved, NodeOutcome::Values(vec![Value::Int(1)]));
        assert!(!state.variables.contains("A"));

        run(&node, &inputs(&[("name", Value::str("B")), ("reset", Value::Bool(true))]), &mut state).unwrap();
        assert!(state.variables.is_empty());
    }

    #[test]
    fn if_condition_picks_one_lazy_branch() {
        let node = Node::new("if", NodeType::IfCondition, json!({}));
        let state = RunState::default();
        let ins = inputs(&[("a", Value::Int(3)), ("b", Value::Int(2)), ("condition", Value::str("A >= B"))]);
        let demand = executor().required_inputs(&node, &ins, &state).unwrap();
        assert_eq!(demand, InputDemand { lazy: vec!["if_true"], decision: Some(true) });

        let inverted = inputs(&[
            ("a", Value::Int(3)),
            ("b", Value::Int(2)),
            ("condition", Value::str("A >= B")),
            ("invert", Value::Bool(true)),
        ]);
        let demand = executor().required_inputs(&node, &inverted, &state).unwrap();
        assert_eq!(demand.lazy, vec!["if_false"]);
    }

    #[test]
    fn if_condition_comparison_modes() {
        let node = Node::new("if", NodeType::IfCondition, json!({}));
        let state = RunState::default();
        let check = |pairs: &[(&str, Value)]| executor().if_condition(&node, &inputs(pairs), &state).unwrap();
        assert!(check(&[("a", Value::str("ab")), ("b", Value::str("cab")), ("condition", Value::str("A in B"))]));
        assert!(check(&[
            ("a", Value::List(vec![Value::None; 3])),
            ("b", Value::Int(3)),
            ("condition", Value::str("A == B")),
            ("comparison", Value::str("Length(A)|Value(B)")),
        ]));
        assert!(check(&[
            ("a", Value::Int(2)),
            ("condition", Value::str("expression")),
            ("expression", Value::str("A * 2 == 4")),
        ]));
        assert!(!check(&[("condition", Value::str("A is TRUE"))]));
        assert!(check(&[("condition", Value::str("B is NONE"))]));
    }

    #[test]
    fn halt_interrupts_unless_disabled_or_empty() {
        let node = Node::new("halt", NodeType::Halt, json!({}));
        let mut state = RunState::default();
        assert_eq!(run(&node, &inputs(&[("input", Value::Int(1))]), &mut state).unwrap(), NodeOutcome::Interrupt);
        assert_eq!(
            run(&node, &inputs(&[("input", Value::Int(1)), ("disable", Value::Bool(true))]), &mut state).unwrap(),
            NodeOutcome::Values(vec![Value::Int(1)])
        );
        assert_eq!(run(&node, &inputs(&[]), &mut state).unwrap(), NodeOutcome::Values(vec![Value::None]));
    }

    #[test]
    fn cycle_consumers_need_a_handle() {
        let node = Node::new("end", NodeType::CycleEnd, json!({}));
        let err = run(&node, &inputs(&[]), &mut RunState::default()).unwrap_err();
        assert!(matches!(err.downcast_ref::<ControlError>(), Some(ControlError::MissingCycleState(_))));
    }

    #[test]
    fn loop_open_without_blocking_support_is_fatal() {
        let limited = NodeExecutor::with_capabilities(
            Arc::new(Evaluator::default()),
            HostCapabilities { blocking: false, expansion: true },
        );
        let node = Node::new("open", NodeType::LoopOpen, json!({}));
        let err = limited.execute(&node, &Inputs::new(), None, &mut RunState::default(), &empty_graph()).unwrap_err();
        assert!(matches!(err.downcast_ref::<ControlError>(), Some(ControlError::UnsupportedCapability(_))));
    }

    #[test]
    fn loop_open_demands_carried_inputs_only_when_open() {
        let node = Node::new("open", NodeType::LoopOpen, json!({}));
        let state = RunState::default();
        let closed = inputs(&[("condition", Value::str("index > 5"))]);
        let demand = executor().required_inputs(&node, &closed, &state).unwrap();
        assert!(demand.lazy.is_empty());
        assert_eq!(demand.decision, Some(false));

        let outcome = executor().execute(&node, &closed, demand.decision, &mut RunState::default(), &empty_graph());
        assert_eq!(outcome.unwrap(), NodeOutcome::Blocked);
    }

    #[test]
    fn loop_close_rejects_status_from_elsewhere() {
        let wf = Workflow {
            id: "wf".into(),
            name: "t".into(),
            nodes: vec![
                Node::new("not-open", NodeType::Constant, json!({})),
                Node::new("close", NodeType::LoopClose, json!({})),
            ],
            edges: vec![Edge::new("not-open", 0, "close", "status")],
        };
        let graph = ExecutionGraph::build(&wf).unwrap();
        let status = LoopStatus::new("l", "not-open", 0, 1, 3, 0).to_value();
        let close = Node::new("close", NodeType::LoopClose, json!({}));
        let err = executor()
            .execute(&close, &inputs(&[("status", status)]), None, &mut RunState::default(), &graph)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ControlError>(), Some(ControlError::UnpairedClose { .. })));
    }

    #[test]
    fn pure_nodes_fingerprint_their_inputs() {
        let node = Node::new("c", NodeType::Constant, json!({}));
        let a = executor().change_signal(&node, &inputs(&[("value", Value::Int(1))]));
        let b = executor().change_signal(&node, &inputs(&[("value", Value::Int(2))]));
        assert_ne!(a, b);
        let open = Node::new("open", NodeType::LoopOpen, json!({}));
        assert_eq!(executor().change_signal(&open, &Inputs::new()), ChangeSignal::Always);
    }

    #[test]
    fn store_reading_conditions_are_never_cached() {
        let node = Node::new("if", NodeType::IfCondition, json!({}));
        let compared = inputs(&[("a", Value::Int(1)), ("condition", Value::str("A > B"))]);
        assert!(matches!(executor().change_signal(&node, &compared), ChangeSignal::Fingerprint(_)));

        let scripted = inputs(&[("condition", Value::str("expression")), ("expression", Value::str("x > 0"))]);
        assert_eq!(executor().change_signal(&node, &scripted), ChangeSignal::Always);
    }
}

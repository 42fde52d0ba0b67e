/// Intra-run loop protocol
///
/// A loop body sits between a LoopOpen and a LoopClose node. The open marker
/// decides whether the body runs at all and publishes a `LoopStatus`; the close
/// marker decides whether to stop or to hand a cloned next iteration back to
/// the host.

use crate::control::{counter, ControlError};
use crate::eval::{Dict, Environment, Evaluator, Value};

/// Names of the values a loop carries from one iteration to the next
pub const CARRIED_SLOTS: [&str; 4] = ["data", "aux", "aux2", "aux3"];

/// Status of one loop iteration
///
/// Created by the open marker, read by the close marker, replaced by a fresh
/// one in every cloned iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStatus {
    /// Stable across all iterations of one logical loop
    pub loop_id: String,
    /// The open node (original or clone) of this iteration
    pub iteration_node_id: String,
    pub start: i64,
    pub step: i64,
    pub end: i64,
    pub index: i64,
    /// No iteration follows this one
    pub finished: bool,
    /// Last evaluated open condition
    pub open_condition: bool,
    /// Last evaluated close condition; true until the close marker runs
    pub close_condition: bool,
}

impl LoopStatus {
    pub fn new(
        loop_id: impl Into<String>,
        iteration_node_id: impl Into<String>,
        start: i64,
        step: i64,
        end: i64,
        index: i64,
    ) -> Self {
        Self {
            loop_id: loop_id.into(),
            iteration_node_id: iteration_node_id.into(),
            start,
            step,
            end,
            index,
            finished: counter::is_last(index, end, step),
            open_condition: true,
            close_condition: true,
        }
    }

    pub fn next_index(&self) -> i64 {
        counter::next_index(self.index, self.step)
    }

    /// Condition environment: the variable store overlaid with the loop fields
    /// and any carried values already materialised
    pub fn environment(&self, store: &Environment, carried: Option<&[Value; 4]>) -> Environment {
        let mut env = store.clone();
        env.insert("start".into(), Value::Int(self.start));
        env.insert("end".into(), Value::Int(self.end));
        env.insert("step".into(), Value::Int(self.step));
        env.insert("index".into(), Value::Int(self.index));
        env.insert("finished".into(), Value::Bool(self.finished));
        env.insert("loop_id".into(), Value::str(self.loop_id.as_str()));
        if let Some(values) = carried {
            for (slot, value) in CARRIED_SLOTS.iter().zip(values) {
                env.insert((*slot).into(), value.clone());
            }
        }
        env
    }

    /// Dict form passed along the status edge
    pub fn to_value(&self) -> Value {
        let mut dict = Dict::new();
        let entries = [
            ("loop_id", Value::str(self.loop_id.as_str())),
            ("iteration_node_id", Value::str(self.iteration_node_id.as_str())),
            ("start", Value::Int(self.start)),
            ("step", Value::Int(self.step)),
            ("end", Value::Int(self.end)),
            ("index", Value::Int(self.index)),
            ("finished", Value::Bool(self.finished)),
            ("open_condition", Value::Bool(self.open_condition)),
            ("close_condition", Value::Bool(self.close_condition)),
        ];
        for (name, value) in entries {
            let _ = dict.insert(Value::str(name), value);
        }
        Value::Dict(dict)
    }

    /// Parse a status received by `consumer`
    pub fn from_value(value: &Value, consumer: &str) -> Result<Self, ControlError> {
        let missing = || ControlError::MissingLoopStatus(consumer.to_string());
        let Value::Dict(dict) = value else { return Err(missing()) };
        let text = |name: &str| match dict.get(&Value::str(name)) {
            Some(Value::Str(s)) => Ok(s.clone()),
            _ => Err(missing()),
        };
        let int = |name: &str| match dict.get(&Value::str(name)) {
            Some(Value::Int(i)) => Ok(*i),
            _ => Err(missing()),
        };
        let flag = |name: &str| match dict.get(&Value::str(name)) {
            Some(Value::Bool(b)) => Ok(*b),
            _ => Err(missing()),
        };
        Ok(Self {
            loop_id: text("loop_id")?,
            iteration_node_id: text("iteration_node_id")?,
            start: int("start")?,
            step: int("step")?,
            end: int("end")?,
            index: int("index")?,
            finished: flag("finished")?,
            open_condition: flag("open_condition")?,
            close_condition: flag("close_condition")?,
        })
    }
}

/// Index of an iteration
///
/// A clone receives its index from the expansion; otherwise an override
/// applies before falling back to `start`.
pub fn resolve_index(expanded: Option<i64>, index_override: Option<i64>, start: i64) -> i64 {
    expanded.or(index_override).unwrap_or(start)
}

/// Evaluate a loop condition; an empty condition always holds
pub fn test_condition(
    evaluator: &Evaluator,
    node_id: &str,
    source: &str,
    env: &Environment,
) -> Result<bool, ControlError> {
    if source.trim().is_empty() {
        return Ok(true);
    }
    evaluator
        .evaluate(source, env)
        .map(|value| value.truthy())
        .map_err(|source| ControlError::Evaluation { node: node_id.to_string(), source })
}

/// Decision of the open marker
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    /// Condition failed; nothing in the body may run
    Blocked(LoopStatus),
    /// Body runs with this status
    Open(LoopStatus),
}

pub fn open(mut status: LoopStatus, condition: bool) -> OpenOutcome {
    status.open_condition = condition;
    if condition {
        OpenOutcome::Open(status)
    } else {
        OpenOutcome::Blocked(status)
    }
}

/// Decision of the close marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Current body values are the loop's result
    Finished,
    /// Another iteration runs at `next_index`
    Continue { next_index: i64 },
}

pub fn close(status: &mut LoopStatus, condition: bool) -> CloseOutcome {
    status.close_condition = condition;
    if status.finished || !condition {
        CloseOutcome::Finished
    } else {
        CloseOutcome::Continue { next_index: status.next_index() }
    }
}

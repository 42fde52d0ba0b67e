/// Cross-run cycle state machine
///
/// A cycle threads a counter and a carried payload through separate,
/// independently triggered executions of the same workflow. The first run after
/// creation or a reset is a dry run: the index is unset and consumers receive
/// nothing, which lets them reset their own state.

use crate::control::{counter, ControlError};
use crate::eval::{Dict, Value};
use std::collections::HashMap;

/// Identity of one cycle instance: the Cycle node's position in a workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CycleKey {
    pub workflow: String,
    pub node: String,
}

impl CycleKey {
    pub fn new(workflow: impl Into<String>, node: impl Into<String>) -> Self {
        Self { workflow: workflow.into(), node: node.into() }
    }

    /// Handle passed from the Cycle node to its consumers
    ///
    /// Carries the key plus a snapshot of the state for introspection.
    pub fn to_handle(&self, state: &CycleState) -> Value {
        let mut dict = Dict::new();
        let entries = [
            ("workflow", Value::str(self.workflow.as_str())),
            ("node", Value::str(self.node.as_str())),
            ("index", state.index.map_or(Value::None, Value::Int)),
            ("start", Value::Int(state.start)),
            ("step", Value::Int(state.step)),
            ("end", Value::Int(state.end)),
            ("finished", Value::Bool(state.finished)),
        ];
        for (name, value) in entries {
            // string keys are always hashable
            let _ = dict.insert(Value::str(name), value);
        }
        Value::Dict(dict)
    }

    /// Recover the key from a handle, if it is one
    pub fn from_handle(handle: &Value) -> Option<Self> {
        let Value::Dict(dict) = handle else { return None };
        match (dict.get(&Value::str("workflow")), dict.get(&Value::str("node"))) {
            (Some(Value::Str(workflow)), Some(Value::Str(node))) => Some(Self::new(workflow.as_str(), node.as_str())),
            _ => None,
        }
    }
}

impl std::fmt::Display for CycleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workflow, self.node)
    }
}

/// Settings a Cycle node supplies on every run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleParams {
    pub start: i64,
    pub step: i64,
    pub end: i64,
    /// Force a fresh dry run on this call
    pub manual_reset: bool,
    /// Restart transparently once the counter finishes
    pub auto_reset: bool,
}

impl Default for CycleParams {
    fn default() -> Self {
        Self { start: 0, step: 1, end: 10, manual_reset: false, auto_reset: true }
    }
}

/// State of one cycle instance
#[derive(Debug, Clone, PartialEq)]
pub struct CycleState {
    /// Current counter; `None` during the dry run
    pub index: Option<i64>,
    pub start: i64,
    pub step: i64,
    pub end: i64,
    pub finished: bool,
    pub auto_reset: bool,
    /// Payload stored by the last advance, delivered on the next run
    pub carried: Option<(Value, Value)>,
}

/// Values a cycle consumer forwards downstream
#[derive(Debug, Clone, PartialEq)]
pub struct Forwarded {
    pub data: Value,
    pub aux: Value,
    pub index: Option<i64>,
}

/// Outcome of advancing a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The dry run ended; the index now sits at `start`
    DryRun,
    /// Index moved (or auto-reset) and the completion test ran
    Step { index: i64, finished: bool },
}

impl CycleState {
    /// Fresh state in dry-run position
    pub fn new(params: &CycleParams) -> Self {
        Self {
            index: None,
            start: params.start,
            step: params.step,
            end: params.end,
            finished: false,
            auto_reset: params.auto_reset,
            carried: None,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.index.is_none()
    }

    /// Start of a run; returns whether the state was replaced by a fresh dry run
    ///
    /// The state resets on a manual reset, or when it finished while auto-reset
    /// was enabled. Otherwise the stored settings are kept as they are.
    pub fn begin(&mut self, params: &CycleParams) -> bool {
        if params.manual_reset || (self.finished && self.auto_reset) {
            *self = Self::new(params);
            true
        } else {
            false
        }
    }

    /// Values handed to the loop body this run
    ///
    /// During the dry run everything is `None` regardless of what was carried.
    /// An override moves the index before it is reported.
    pub fn forward(&mut self, data: Value, aux: Value, index_override: Option<i64>) -> Forwarded {
        if self.index.is_none() {
            return Forwarded { data: Value::None, aux: Value::None, index: None };
        }
        if let Some(index) = index_override {
            self.index = Some(index);
        }
        let (data, aux) = match &self.carried {
            Some((carried_data, carried_aux)) => (carried_data.clone(), carried_aux.clone()),
            None => (data, aux),
        };
        Forwarded { data, aux, index: self.index }
    }

    /// End of a run: store the payload for the next run and step the counter
    pub fn advance(&mut self, data: Value, aux: Value) -> Advance {
        let Some(index) = self.index else {
            self.index = Some(self.start);
            return Advance::DryRun;
        };
        self.carried = Some((data, aux));
        let next = counter::next_index(index, self.step);
        self.finished = counter::exhausted(next, self.end, self.step);
        let next = if self.finished && self.auto_reset { self.start } else { next };
        self.index = Some(next);
        Advance::Step { index: next, finished: self.finished }
    }
}

/// Cycle states of every workflow, keyed by Cycle node position
///
/// Lives for the whole process; states are never dropped except when their
/// workflow is removed.
#[derive(Debug, Clone, Default)]
pub struct CycleRegistry {
    states: HashMap<CycleKey, CycleState>,
}

impl CycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a run of the cycle at `key`, creating it on first use
    pub fn begin(&mut self, key: &CycleKey, params: &CycleParams) -> (CycleState, bool) {
        let mut created = false;
        let state = self.states.entry(key.clone()).or_insert_with(|| {
            created = true;
            CycleState::new(params)
        });
        let dry_run = created || state.begin(params);
        if dry_run {
            tracing::info!("🔁 Cycle {} starts a dry run (start={}, end={}, step={})", key, state.start, state.end, state.step);
        }
        (state.clone(), dry_run)
    }

    pub fn get(&self, key: &CycleKey) -> Result<&CycleState, ControlError> {
        self.states.get(key).ok_or_else(|| ControlError::MissingCycleState(key.to_string()))
    }

    pub fn forward(
        &mut self,
        key: &CycleKey,
        data: Value,
        aux: Value,
        index_override: Option<i64>,
    ) -> Result<Forwarded, ControlError> {
        Ok(self.state_mut(key)?.forward(data, aux, index_override))
    }

    pub fn advance(&mut self, key: &CycleKey, data: Value, aux: Value) -> Result<Advance, ControlError> {
        let advance = self.state_mut(key)?.advance(data, aux);
        if let Advance::Step { index, finished: true } = advance {
            tracing::info!("🏁 Cycle {} finished; next index {}", key, index);
        }
        Ok(advance)
    }

    /// Drop every cycle belonging to `workflow`
    pub fn remove_workflow(&mut self, workflow: &str) {
        self.states.retain(|key, _| key.workflow != workflow);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn state_mut(&mut self, key: &CycleKey) -> Result<&mut CycleState, ControlError> {
        self.states.get_mut(key).ok_or_else(|| ControlError::MissingCycleState(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(start: i64, step: i64, end: i64, auto_reset: bool) -> CycleParams {
        CycleParams { start, step, end, manual_reset: false, auto_reset }
    }

    /// Runs the cycle until it reports finished, returning the pre-advance
    /// indices seen after the dry run
    fn run_to_finish(state: &mut CycleState) -> Vec<i64> {
        assert_eq!(state.advance(Value::None, Value::None), Advance::DryRun);
        let mut seen = Vec::new();
        for _ in 0..100 {
            let before = state.index.unwrap();
            seen.push(before);
            if let Advance::Step { finished: true, .. } = state.advance(Value::None, Value::None) {
                return seen;
            }
        }
        panic!("cycle never finished");
    }

    #[test]
    fn ascending_finishes_on_end_after_inclusive_count() {
        for (start, end) in [(0, 0), (0, 4), (3, 7), (-2, 2)] {
            let mut state = CycleState::new(&params(start, 1, end, false));
            let seen = run_to_finish(&mut state);
            assert_eq!(seen.len() as i64, end - start + 1);
            assert_eq!(*seen.last().unwrap(), end);
        }
    }

    #[test]
    fn descending_finishes_after_reaching_end() {
        let mut state = CycleState::new(&params(5, -1, 0, false));
        let seen = run_to_finish(&mut state);
        assert_eq!(seen, vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn dry_run_forwards_nothing() {
        let mut state = CycleState::new(&params(0, 1, 3, true));
        state.carried = Some((Value::Int(9), Value::Int(9)));
        let forwarded = state.forward(Value::Int(1), Value::Int(2), Some(7));
        assert_eq!(forwarded, Forwarded { data: Value::None, aux: Value::None, index: None });
        assert!(state.is_dry_run());
    }

    #[test]
    fn carried_payload_wins_over_inputs() {
        let mut state = CycleState::new(&params(0, 1, 3, true));
        state.advance(Value::None, Value::None);
        let first = state.forward(Value::Int(1), Value::Int(2), None);
        assert_eq!((first.data, first.aux, first.index), (Value::Int(1), Value::Int(2), Some(0)));

        state.advance(Value::str("next"), Value::str("aux"));
        let second = state.forward(Value::Int(1), Value::Int(2), None);
        assert_eq!(second.data, Value::str("next"));
        assert_eq!(second.aux, Value::str("aux"));
        assert_eq!(second.index, Some(1));
    }

    #[test]
    fn index_override_moves_counter() {
        let mut state = CycleState::new(&params(0, 1, 10, false));
        state.advance(Value::None, Value::None);
        assert_eq!(state.forward(Value::None, Value::None, Some(8)).index, Some(8));
        assert_eq!(state.advance(Value::None, Value::None), Advance::Step { index: 9, finished: false });
    }

    #[test]
    fn auto_reset_round_trip() {
        let p = params(2, 1, 3, true);
        let mut state = CycleState::new(&p);
        state.advance(Value::None, Value::None);
        state.advance(Value::None, Value::None);
        assert_eq!(state.advance(Value::None, Value::None), Advance::Step { index: 2, finished: true });

        assert!(state.begin(&p));
        assert!(state.is_dry_run());
        assert_eq!(state.start, 2);
        assert!(state.carried.is_none());
    }

    #[test]
    fn finished_without_auto_reset_stays_put() {
        let p = params(0, 1, 0, false);
        let mut state = CycleState::new(&p);
        state.advance(Value::None, Value::None);
        assert_eq!(state.advance(Value::None, Value::None), Advance::Step { index: 1, finished: true });
        assert!(!state.begin(&p));
        assert_eq!(state.index, Some(1));
    }

    #[test]
    fn manual_reset_always_restarts() {
        let mut state = CycleState::new(&params(0, 1, 5, false));
        state.advance(Value::None, Value::None);
        state.advance(Value::None, Value::None);
        let reset = CycleParams { manual_reset: true, ..params(1, 2, 9, false) };
        assert!(state.begin(&reset));
        assert_eq!((state.index, state.start, state.step, state.end), (None, 1, 2, 9));
    }

    #[test]
    fn zero_step_never_finishes() {
        let mut state = CycleState::new(&params(0, 0, 0, false));
        state.advance(Value::None, Value::None);
        for _ in 0..5 {
            assert_eq!(state.advance(Value::None, Value::None), Advance::Step { index: 0, finished: false });
        }
    }

    #[test]
    fn registry_requires_begin_before_use() {
        let mut registry = CycleRegistry::new();
        let key = CycleKey::new("wf", "cycle");
        assert!(matches!(
            registry.advance(&key, Value::None, Value::None),
            Err(ControlError::MissingCycleState(_))
        ));

        let (state, dry_run) = registry.begin(&key, &CycleParams::default());
        assert!(dry_run && state.is_dry_run());
        let (state, replaced) = registry.begin(&key, &CycleParams::default());
        assert!(!replaced);
        assert!(state.is_dry_run());
    }

    #[test]
    fn handle_round_trips_key() {
        let key = CycleKey::new("wf", "c1");
        let handle = key.to_handle(&CycleState::new(&CycleParams::default()));
        assert_eq!(CycleKey::from_handle(&handle), Some(key));
        assert_eq!(CycleKey::from_handle(&Value::Int(1)), None);
    }

    #[test]
    fn removing_workflow_drops_its_cycles() {
        let mut registry = CycleRegistry::new();
        registry.begin(&CycleKey::new("a", "c"), &CycleParams::default());
        registry.begin(&CycleKey::new("b", "c"), &CycleParams::default());
        registry.remove_workflow("a");
        assert_eq!(registry.len(), 1);
    }
}

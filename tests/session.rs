//! Session integration tests
//!
//! Cycles and variables live in the session between runs; these tests run the
//! same workflow repeatedly and check what survives.

use loopway::eval::{Evaluator, Value};
use loopway::runtime::{ExecutionEngine, NodeExecutor, RunError, Session};
use loopway::{Edge, Node, NodeType, Workflow};
use serde_json::{json, Value as Json};
use std::sync::Arc;

fn session() -> Session {
    let executor = Arc::new(NodeExecutor::new(Arc::new(Evaluator::default())));
    Session::new(Arc::new(ExecutionEngine::new(executor, 100)))
}

/// Cycle reporting its index at both ends, with data incremented each run
fn counting_cycle(cycle_params: Json) -> Arc<Workflow> {
    Arc::new(Workflow {
        id: "counter".into(),
        name: "counting cycle".into(),
        nodes: vec![
            Node::new("cycle", NodeType::Cycle, cycle_params),
            Node::new("body", NodeType::CycleContinue, json!({"data": 100})),
            Node::new("inc", NodeType::Formula, json!({"expression": "0 if a is None else a + 1"})),
            Node::new("end", NodeType::CycleEnd, json!({})),
            Node::new("index", NodeType::Output, json!({})),
            Node::new("data", NodeType::Output, json!({})),
            Node::new("next", NodeType::Output, json!({})),
            Node::new("finished", NodeType::Output, json!({})),
        ],
        edges: vec![
            Edge::new("cycle", 0, "body", "cycle"),
            Edge::new("cycle", 0, "end", "cycle"),
            Edge::new("body", 0, "inc", "a"),
            Edge::new("inc", 0, "end", "data"),
            Edge::new("body", 2, "index", "value"),
            Edge::new("inc", 0, "data", "value"),
            Edge::new("end", 0, "next", "value"),
            Edge::new("end", 1, "finished", "value"),
        ],
    })
}

#[tokio::test]
async fn test_cycle_counts_across_runs() {
    let session = session();
    let wf = counting_cycle(json!({"start": 0, "step": 1, "end": 2}));

    // Dry run: nothing flows, the counter is armed at start
    let dry = session.run(Arc::clone(&wf)).await.unwrap();
    assert_eq!(dry.outputs["index"], Json::Null);
    assert_eq!(dry.outputs["next"], Json::Null);
    assert_eq!(dry.outputs["data"], json!(0));

    let mut seen = Vec::new();
    for _ in 0..3 {
        let report = session.run(Arc::clone(&wf)).await.unwrap();
        seen.push((
            report.outputs["index"].clone(),
            report.outputs["next"].clone(),
            report.outputs["finished"].clone(),
        ));
    }
    assert_eq!(
        seen,
        vec![
            (json!(0), json!(1), json!(false)),
            (json!(1), json!(2), json!(false)),
            (json!(2), json!(0), json!(true)),
        ]
    );

    // Finished with auto-reset: the next run is a fresh dry run
    let again = session.run(Arc::clone(&wf)).await.unwrap();
    assert_eq!(again.outputs["index"], Json::Null);
}

#[tokio::test]
async fn test_carried_payload_replaces_inputs() {
    let session = session();
    let wf = counting_cycle(json!({"start": 0, "end": 10}));

    session.run(Arc::clone(&wf)).await.unwrap();
    let first = session.run(Arc::clone(&wf)).await.unwrap();
    let second = session.run(Arc::clone(&wf)).await.unwrap();

    // First real run starts from the node's own data, later runs from the payload
    assert_eq!(first.outputs["data"], json!(101));
    assert_eq!(second.outputs["data"], json!(102));
}

#[tokio::test]
async fn test_manual_reset_rearms_the_dry_run() {
    let session = session();
    let wf = counting_cycle(json!({"start": 5, "end": 10}));
    session.run(Arc::clone(&wf)).await.unwrap();
    let counted = session.run(Arc::clone(&wf)).await.unwrap();
    assert_eq!(counted.outputs["index"], json!(5));

    let reset = counting_cycle(json!({"start": 5, "end": 10, "manual_reset": true}));
    let report = session.run(reset).await.unwrap();
    assert_eq!(report.outputs["index"], Json::Null);
}

#[tokio::test]
async fn test_forgotten_workflow_restarts_its_cycles() {
    let session = session();
    let wf = counting_cycle(json!({"start": 0, "end": 10}));
    session.run(Arc::clone(&wf)).await.unwrap();
    session.run(Arc::clone(&wf)).await.unwrap();

    session.forget_workflow("counter").await;
    let report = session.run(wf).await.unwrap();
    assert_eq!(report.outputs["index"], Json::Null);
}

#[tokio::test]
async fn test_persisted_formula_locals_survive_runs() {
    let session = session();
    session.set_variable("counter", Value::Int(1)).await;
    let wf = Arc::new(Workflow {
        id: "bump".into(),
        name: "bump counter".into(),
        nodes: vec![Node::new(
            "bump",
            NodeType::Formula,
            json!({"expression": "counter = counter + 1", "persist": true}),
        )],
        edges: vec![],
    });

    session.run(Arc::clone(&wf)).await.unwrap();
    session.run(wf).await.unwrap();

    assert_eq!(session.get_variable("counter").await, Some(Value::Int(3)));
    assert_eq!(session.variables().await["counter"], json!(3));
}

#[tokio::test]
async fn test_memory_rename_moves_the_value() {
    let session = session();
    let storing = |name: &str, with_input: bool| {
        let mut edges = vec![];
        let mut nodes = vec![Node::new("mem", NodeType::MemoryStorage, json!({"name": name}))];
        if with_input {
            nodes.push(Node::new("c", NodeType::Constant, json!({"value": [1, 2]})));
            edges.push(Edge::new("c", 0, "mem", "input"));
        }
        Arc::new(Workflow { id: "mem".into(), name: "memory".into(), nodes, edges })
    };

    session.run(storing("A", true)).await.unwrap();
    session.run(storing("B", false)).await.unwrap();

    assert_eq!(session.get_variable("A").await, None);
    assert_eq!(session.variables().await["B"], json!([1, 2]));
    assert_eq!(session.variable_names().await, vec!["B".to_string()]);
}

#[tokio::test]
async fn test_failed_run_changes_nothing() {
    let session = session();
    let wf = Arc::new(Workflow {
        id: "broken".into(),
        name: "fails after storing".into(),
        nodes: vec![
            Node::new("c", NodeType::Constant, json!({"value": 5})),
            Node::new("mem", NodeType::MemoryStorage, json!({"name": "x"})),
            Node::new("boom", NodeType::Formula, json!({"expression": "a + missing"})),
        ],
        edges: vec![Edge::new("c", 0, "mem", "input"), Edge::new("mem", 0, "boom", "a")],
    });

    let err = session.run(wf).await.unwrap_err();
    assert!(matches!(err, RunError::Failed(_)));
    assert!(err.to_string().contains("'boom'"), "{}", err);
    assert_eq!(session.get_variable("x").await, None);
}

#[tokio::test]
async fn test_halt_interrupts_the_run() {
    let session = session();
    let wf = Arc::new(Workflow {
        id: "halt".into(),
        name: "halts".into(),
        nodes: vec![
            Node::new("c", NodeType::Constant, json!({"value": true})),
            Node::new("stop", NodeType::Halt, json!({})),
            Node::new("later", NodeType::Output, json!({"value": 1})),
        ],
        edges: vec![Edge::new("c", 0, "stop", "input")],
    });

    let report = session.run(wf).await.unwrap();
    assert!(report.interrupted);
    assert!(!report.outputs.contains_key("later"));
    assert!(!session.interrupt(), "no run is in flight");
}

#[tokio::test]
async fn test_evaluate_sees_store_and_extra_names() {
    let session = session();
    session.set_variable("base", Value::Int(40)).await;
    let extra = [("x".to_string(), Value::Int(2))].into_iter().collect();

    let value = session.evaluate("base + x", extra).await.unwrap().unwrap();
    assert_eq!(value, Value::Int(42));

    let err = session.evaluate("base + y", Default::default()).await.unwrap().unwrap_err();
    assert_eq!(err.kind(), "NameError");
}

#[tokio::test]
async fn test_store_reading_condition_reruns_after_store_change() {
    let session = session();
    let wf = Arc::new(Workflow {
        id: "sign".into(),
        name: "sign of x".into(),
        nodes: vec![
            Node::new(
                "if",
                NodeType::IfCondition,
                json!({"condition": "expression", "expression": "x > 0", "if_true": "pos", "if_false": "neg"}),
            ),
            Node::new("out", NodeType::Output, json!({})),
        ],
        edges: vec![Edge::new("if", 0, "out", "value")],
    });

    session.set_variable("x", Value::Int(1)).await;
    let first = session.run(Arc::clone(&wf)).await.unwrap();
    assert_eq!(first.outputs["out"], json!("pos"));

    session.set_variable("x", Value::Int(-1)).await;
    let second = session.run(wf).await.unwrap();
    assert_eq!(second.outputs["out"], json!("neg"));
    assert_eq!(second.cached, 0);
}

#[tokio::test]
async fn test_plain_comparison_is_served_from_cache() {
    let session = session();
    let wf = Arc::new(Workflow {
        id: "cmp".into(),
        name: "compare".into(),
        nodes: vec![
            Node::new("if", NodeType::IfCondition, json!({"a": 2, "b": 1, "condition": "A > B", "if_true": "big"})),
            Node::new("out", NodeType::Output, json!({})),
        ],
        edges: vec![Edge::new("if", 0, "out", "value")],
    });

    session.run(Arc::clone(&wf)).await.unwrap();
    let again = session.run(wf).await.unwrap();
    assert_eq!(again.outputs["out"], json!("big"));
    assert_eq!(again.cached, 1);
}

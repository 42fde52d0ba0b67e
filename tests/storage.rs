//! Workflow persistence and hot-reload integration tests

use loopway::workflow::{registry::WorkflowRegistry, storage::WorkflowStorage};
use loopway::{Edge, Node, NodeType, Workflow};
use serde_json::json;
use tempfile::TempDir;

fn sample(id: &str, value: i64) -> Workflow {
    Workflow {
        id: id.into(),
        name: format!("workflow {}", id),
        nodes: vec![
            Node::new("c", NodeType::Constant, json!({"value": value})),
            Node::new("out", NodeType::Output, json!({})),
        ],
        edges: vec![Edge::new("c", 0, "out", "value")],
    }
}

#[tokio::test]
async fn test_storage_persistence() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;

    {
        let storage = WorkflowStorage::connect(temp_dir.path()).await?;
        storage.save_workflow(&sample("one", 1)).await?;
        storage.save_workflow(&sample("two", 2)).await?;
        // Saving again replaces the definition
        storage.save_workflow(&sample("one", 10)).await?;
    }

    // Reopen and verify persistence
    let storage = WorkflowStorage::connect(temp_dir.path()).await?;
    let loaded = storage.get_workflow("one").await?.expect("stored workflow");
    assert_eq!(loaded, sample("one", 10));
    assert_eq!(storage.list_workflows().await?.len(), 2);
    assert!(storage.get_workflow("missing").await?.is_none());

    assert!(storage.delete_workflow("two").await?);
    assert!(!storage.delete_workflow("two").await?);
    assert_eq!(storage.load_all_workflows().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_registry_hot_reload() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = WorkflowStorage::connect(temp_dir.path()).await?;
    storage.save_workflow(&sample("b", 1)).await?;
    storage.save_workflow(&sample("a", 1)).await?;

    let registry = WorkflowRegistry::new(storage.clone());
    registry.init_from_storage().await?;
    assert_eq!(registry.list_workflow_ids(), vec!["a".to_string(), "b".to_string()]);

    // A run holding the old definition keeps it after a reload
    let held = registry.get_workflow("a").expect("loaded");
    storage.save_workflow(&sample("a", 2)).await?;
    registry.reload_workflow("a").await?;
    assert_eq!(held.nodes[0].params, json!({"value": 1}));
    assert_eq!(registry.get_workflow("a").expect("reloaded").nodes[0].params, json!({"value": 2}));

    registry.remove_workflow("b");
    assert!(registry.get_workflow("b").is_none());
    assert!(registry.reload_workflow("missing").await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_invalid_stored_workflow_is_skipped() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = WorkflowStorage::connect(temp_dir.path()).await?;
    let mut broken = sample("broken", 1);
    broken.edges.push(Edge::new("nowhere", 0, "out", "other"));
    storage.save_workflow(&broken).await?;
    storage.save_workflow(&sample("fine", 1)).await?;

    let registry = WorkflowRegistry::new(storage);
    registry.init_from_storage().await?;
    assert_eq!(registry.list_workflow_ids(), vec!["fine".to_string()]);

    Ok(())
}

//! Inventory lister integration tests.
//!
//! Tests verify that:
//! - Server filters reach the engine and client filters are applied after
//! - Compose members are named `project@service`
//! - Engine failures surface as `EngineUnavailable`

use std::sync::Arc;

use twinmon_core::Status;
use twinmon_engine::{
    ContainerSummary, Error, FilterCriteria, InMemoryEngine, InventoryLister, ObservedItem,
};

/// Test helper: Unwrap a Result or panic with context
fn unwrap_result<T, E: std::fmt::Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}: {}", context, e),
    }
}

fn names(items: &[ObservedItem]) -> Vec<&str> {
    items.iter().map(|item| item.name.as_str()).collect()
}

async fn populated_engine() -> Arc<InMemoryEngine> {
    let engine = Arc::new(InMemoryEngine::new());
    engine
        .upsert(ContainerSummary::new("a1", "nginx", "running"))
        .await;
    engine
        .upsert(ContainerSummary::new("b2", "app-web-1", "running").with_compose("app", "web"))
        .await;
    engine
        .upsert(ContainerSummary::new("c3", "buildkitd", "exited"))
        .await;
    engine
        .upsert(
            ContainerSummary::new("d4", "sidecar", "paused").with_label("tedge.ignore", "true"),
        )
        .await;
    engine
}

#[tokio::test]
async fn full_scan_lists_every_allowed_container() {
    // GIVEN: An engine with plain and compose containers
    let engine = populated_engine().await;
    let lister = InventoryLister::new(engine.clone());

    // WHEN: Listing with the default type allow-list
    let criteria = FilterCriteria {
        types: vec!["container".to_string(), "container-group".to_string()],
        ..FilterCriteria::default()
    };
    let items = unwrap_result(lister.list(&criteria).await, "list should succeed");

    // THEN: Every container is returned in engine order with derived fields
    assert_eq!(names(&items), vec!["nginx", "app@web", "buildkitd", "sidecar"]);
    assert_eq!(items[1].service_type, "container-group");
    assert_eq!(items[2].status, Status::Down);
    assert_eq!(items[3].status, Status::Down);
}

#[tokio::test]
async fn client_side_exclusions_are_anded() {
    // GIVEN: Exclusions by name pattern and by label
    let engine = populated_engine().await;
    let lister = InventoryLister::new(engine);
    let criteria = FilterCriteria {
        exclude_names: vec!["^buildkit".to_string(), "^app@".to_string()],
        exclude_labels: vec!["tedge.ignore".to_string()],
        ..FilterCriteria::default()
    };

    // WHEN: Listing
    let items = unwrap_result(lister.list(&criteria).await, "list should succeed");

    // THEN: Only the unexcluded container remains
    assert_eq!(names(&items), vec!["nginx"]);
}

#[tokio::test]
async fn targeted_listing_sends_ids_to_engine() {
    // GIVEN: A base criteria restricted to plain containers
    let engine = populated_engine().await;
    let lister = InventoryLister::new(engine.clone());
    let base = FilterCriteria {
        types: vec!["container".to_string()],
        ..FilterCriteria::default()
    };

    // WHEN: Listing a compose member by id
    let items = unwrap_result(
        lister.list(&base.with_ids(["b2"])).await,
        "list should succeed",
    );

    // THEN: The engine saw the id filter, and the type filter still applied
    let calls = engine.list_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].ids, vec!["b2".to_string()]);
    assert!(items.is_empty());
}

#[tokio::test]
async fn engine_failure_is_unavailable() {
    // GIVEN: An engine that cannot be reached
    let engine = populated_engine().await;
    engine.set_unavailable(true);
    let lister = InventoryLister::new(engine);

    // WHEN: Listing
    let result = lister.list(&FilterCriteria::default()).await;

    // THEN: The error is EngineUnavailable
    assert!(matches!(result, Err(Error::EngineUnavailable { .. })));
}

#[tokio::test]
async fn unnamed_containers_are_never_listed_without_a_name() {
    // GIVEN: One container without names and one without names or id
    let engine = Arc::new(InMemoryEngine::new());
    engine
        .upsert(ContainerSummary {
            id: "0123456789abcdef".to_string(),
            state: "running".to_string(),
            ..ContainerSummary::default()
        })
        .await;
    engine
        .upsert(ContainerSummary {
            state: "running".to_string(),
            ..ContainerSummary::default()
        })
        .await;
    let lister = InventoryLister::new(engine);

    // WHEN: Listing everything
    let items = unwrap_result(
        lister.list(&FilterCriteria::default()).await,
        "list should succeed",
    );

    // THEN: The first is named by its short id, the second is skipped
    assert_eq!(names(&items), vec!["0123456789ab"]);
}

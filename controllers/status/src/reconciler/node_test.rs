//! Unit tests for node hold-off coordination

use super::node::{node_update_state, selector_matches, NodeUpdate};
use crate::test_utils::*;
use crds::{HOLDOFF_ANNOTATION, REINIT_ANNOTATION};
use std::collections::BTreeMap;

const WORKER: &[(&str, &str)] = &[("node-role.kubernetes.io/worker", "")];

#[test]
fn test_node_update_state() {
    let updating = create_test_node("worker-1", WORKER, "rendered-1", "rendered-2", "Working");
    assert_eq!(node_update_state(&updating), Some(NodeUpdate::Updating));

    let done = create_test_node("worker-1", WORKER, "rendered-2", "rendered-2", "Done");
    assert_eq!(node_update_state(&done), Some(NodeUpdate::Settled));

    let degraded = create_test_node("worker-1", WORKER, "rendered-1", "rendered-2", "Degraded");
    assert_eq!(node_update_state(&degraded), Some(NodeUpdate::Settled));

    let pending = create_test_node("worker-1", WORKER, "rendered-1", "rendered-2", "Done");
    assert_eq!(node_update_state(&pending), Some(NodeUpdate::Other));

    let mut unmanaged = done.clone();
    unmanaged.metadata.annotations = None;
    assert_eq!(node_update_state(&unmanaged), None);
}

#[test]
fn test_selector_matching() {
    let labels = BTreeMap::from([
        ("node-role.kubernetes.io/worker".to_string(), String::new()),
        ("zone".to_string(), "a".to_string()),
    ]);
    assert!(selector_matches(&BTreeMap::new(), &labels));
    assert!(selector_matches(
        &BTreeMap::from([("zone".to_string(), "a".to_string())]),
        &labels
    ));
    assert!(!selector_matches(
        &BTreeMap::from([("zone".to_string(), "b".to_string())]),
        &labels
    ));
    assert!(!selector_matches(
        &BTreeMap::from([("node-role.kubernetes.io/master".to_string(), String::new())]),
        &labels
    ));
}

#[tokio::test]
async fn test_updating_node_is_held_off_once() {
    let (reconciler, client) = create_test_reconciler();
    client.add_file_integrity(create_test_file_integrity("example", None));
    let node = create_test_node("worker-1", WORKER, "rendered-1", "rendered-2", "Working");

    reconciler.reconcile_node(&node).await.unwrap();
    reconciler.reconcile_node(&node).await.unwrap();

    let fi = client.file_integrity("example");
    assert_eq!(fi.annotation(HOLDOFF_ANNOTATION), Some("worker-1"));
    assert_eq!(fi.annotation(REINIT_ANNOTATION), None);
}

#[tokio::test]
async fn test_settled_node_is_released_and_reinitialized() {
    let (reconciler, client) = create_test_reconciler();
    client.add_file_integrity(create_test_file_integrity("example", None));

    let updating = create_test_node("worker-1", WORKER, "rendered-1", "rendered-2", "Working");
    let other = create_test_node("worker-2", WORKER, "rendered-1", "rendered-2", "Working");
    reconciler.reconcile_node(&updating).await.unwrap();
    reconciler.reconcile_node(&other).await.unwrap();
    assert_eq!(
        client.file_integrity("example").annotation(HOLDOFF_ANNOTATION),
        Some("worker-1,worker-2")
    );

    let done = create_test_node("worker-1", WORKER, "rendered-2", "rendered-2", "Done");
    reconciler.reconcile_node(&done).await.unwrap();

    let fi = client.file_integrity("example");
    assert_eq!(fi.annotation(HOLDOFF_ANNOTATION), Some("worker-2"));
    assert_eq!(fi.annotation(REINIT_ANNOTATION), Some("worker-1"));

    let done = create_test_node("worker-2", WORKER, "rendered-2", "rendered-2", "Done");
    reconciler.reconcile_node(&done).await.unwrap();

    let fi = client.file_integrity("example");
    assert_eq!(fi.annotation(HOLDOFF_ANNOTATION), None, "last node removes the annotation");
    assert_eq!(fi.annotation(REINIT_ANNOTATION), Some("worker-1,worker-2"));
}

#[tokio::test]
async fn test_settled_node_without_hold_off_is_left_alone() {
    let (reconciler, client) = create_test_reconciler();
    client.add_file_integrity(create_test_file_integrity("example", None));
    let done = create_test_node("worker-1", WORKER, "rendered-2", "rendered-2", "Done");

    reconciler.reconcile_node(&done).await.unwrap();

    let fi = client.file_integrity("example");
    assert_eq!(fi.annotation(HOLDOFF_ANNOTATION), None);
    assert_eq!(fi.annotation(REINIT_ANNOTATION), None);
}

#[tokio::test]
async fn test_only_matching_file_integrities_are_held_off() {
    let (reconciler, client) = create_test_reconciler();
    client.add_file_integrity(create_test_file_integrity("workers", None));
    let mut masters = create_test_file_integrity("masters", None);
    masters.spec.node_selector =
        BTreeMap::from([("node-role.kubernetes.io/master".to_string(), String::new())]);
    client.add_file_integrity(masters);

    let node = create_test_node("worker-1", WORKER, "rendered-1", "rendered-2", "Working");
    reconciler.reconcile_node(&node).await.unwrap();

    assert_eq!(client.file_integrity("workers").annotation(HOLDOFF_ANNOTATION), Some("worker-1"));
    assert_eq!(client.file_integrity("masters").annotation(HOLDOFF_ANNOTATION), None);
}

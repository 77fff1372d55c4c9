//! Unit tests for report aggregation

use super::report::scan_result_from_report;
use crate::test_utils::*;
use chrono::Utc;
use crds::*;
use kube::ResourceExt;

#[test]
fn test_classify_reports() {
    let ok = create_test_report("example", "worker-1", &[], None);
    assert_eq!(scan_result_from_report(&ok, Utc::now()).condition, NodeCondition::Succeeded);

    let failed = create_test_report(
        "example",
        "worker-1",
        &[
            (FILES_ADDED_ANNOTATION, "3"),
            (FILES_CHANGED_ANNOTATION, "1"),
            (FILES_REMOVED_ANNOTATION, "0"),
        ],
        Some("AIDE found differences"),
    );
    let result = scan_result_from_report(&failed, Utc::now());
    assert_eq!(result.condition, NodeCondition::Failed);
    assert_eq!((result.files_added, result.files_changed, result.files_removed), (3, 1, 0));

    let errored = create_test_report(
        "example",
        "worker-1",
        &[(ERROR_MSG_ANNOTATION, "Error initializing the AIDE DB")],
        Some("partial log"),
    );
    let result = scan_result_from_report(&errored, Utc::now());
    assert_eq!(result.condition, NodeCondition::Errored);
    assert_eq!(result.error_message.as_deref(), Some("Error initializing the AIDE DB"));
}

#[tokio::test]
async fn test_ok_report_creates_node_status_and_is_deleted() {
    let (reconciler, client) = create_test_reconciler();
    client.add_file_integrity(create_test_file_integrity("example", None));
    let report = create_test_report("example", "worker-1", &[], None);

    reconciler.reconcile_report(&report).await.unwrap();

    let state = client.state();
    let status = &state.node_statuses["example-worker-1"];
    assert_eq!(status.spec.node_name, "worker-1");
    assert_eq!(status.spec.condition(), Some(NodeCondition::Succeeded));
    assert_eq!(status.labels().get(OWNER_LABEL).map(String::as_str), Some("example"));
    let owners = status.owner_references();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].uid, "uid-example");
    assert_eq!(state.deleted_config_maps, vec![report.name_any()]);
}

#[tokio::test]
async fn test_failed_report_keeps_a_durable_log_copy() {
    let (reconciler, client) = create_test_reconciler();
    client.add_file_integrity(create_test_file_integrity("example", None));
    let report = create_test_report(
        "example",
        "worker-1",
        &[(FILES_ADDED_ANNOTATION, "2"), (COMPRESSED_ANNOTATION, "")],
        Some("H4sIAAAAAAAA"),
    );

    reconciler.reconcile_report(&report).await.unwrap();

    let state = client.state();
    let copy = &state.config_maps[&failed_log_name("example", "worker-1")];
    assert_eq!(copy.data, report.data);
    assert!(copy.annotations().contains_key(COMPRESSED_ANNOTATION));

    let last = state.node_statuses["example-worker-1"].spec.last_result.clone().unwrap();
    assert_eq!(last.condition, NodeCondition::Failed);
    assert_eq!(last.files_added, 2);
    assert_eq!(last.result_config_map_name.as_deref(), Some("aide-example-worker-1-failed"));
    assert_eq!(last.result_config_map_namespace.as_deref(), Some(NAMESPACE));
}

#[tokio::test]
async fn test_results_accumulate_in_history() {
    let (reconciler, client) = create_test_reconciler();
    client.add_file_integrity(create_test_file_integrity("example", None));

    let reports = [
        create_test_report("example", "worker-1", &[], None),
        create_test_report("example", "worker-1", &[], Some("changed")),
        create_test_report("example", "worker-1", &[(ERROR_MSG_ANNOTATION, "boom")], None),
    ];
    for report in &reports {
        reconciler.reconcile_report(report).await.unwrap();
    }

    let state = client.state();
    let spec = &state.node_statuses["example-worker-1"].spec;
    let conditions: Vec<_> = spec.results.iter().map(|r| r.condition).collect();
    assert_eq!(
        conditions,
        vec![NodeCondition::Succeeded, NodeCondition::Failed, NodeCondition::Errored]
    );
}

#[tokio::test]
async fn test_orphaned_report_is_deleted() {
    let (reconciler, client) = create_test_reconciler();
    let report = create_test_report("gone", "worker-1", &[], None);

    reconciler.reconcile_report(&report).await.unwrap();

    let state = client.state();
    assert!(state.node_statuses.is_empty());
    assert_eq!(state.deleted_config_maps, vec![report.name_any()]);
}

#[tokio::test]
async fn test_report_without_node_label_is_skipped() {
    let (reconciler, client) = create_test_reconciler();
    client.add_file_integrity(create_test_file_integrity("example", None));
    let mut report = create_test_report("example", "worker-1", &[], None);
    report.labels_mut().remove(NODE_LABEL);

    reconciler.reconcile_report(&report).await.unwrap();

    let state = client.state();
    assert!(state.node_statuses.is_empty());
    assert!(state.deleted_config_maps.is_empty());
}

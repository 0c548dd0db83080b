//! Integration tests for duplicate detection and merging.

use braid::Error;
use braid::domain::{DependencyType, IssueId, IssueStatus, NewIssue};
use braid::error::GraphError;
use braid::reconcile::{RecordBatch, find_duplicate_groups, merge_issues};
use braid::store::Store;

/// Two content-identical open issues with distinct ids, plus a bystander.
///
/// Duplicates cannot be minted through `create` (identical content is
/// idempotent there), so they arrive the way they do in practice: via
/// import from divergent branches.
async fn store_with_duplicates() -> (Store, IssueId, IssueId, IssueId) {
    let store = Store::in_memory("bd");
    let lines = [
        r#"{"id":"bd-aaaa","title":"Fix login","description":"same bug"}"#,
        r#"{"id":"bd-bbbb","title":"Fix login","description":"same bug"}"#,
        r#"{"id":"bd-cccc","title":"Unrelated","description":"see bd-bbbb for details"}"#,
    ];
    let records = lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    store
        .import_batch(RecordBatch {
            records,
            warnings: Vec::new(),
        })
        .await;
    (
        store,
        IssueId::new("bd-aaaa"),
        IssueId::new("bd-bbbb"),
        IssueId::new("bd-cccc"),
    )
}

#[tokio::test]
async fn duplicates_group_by_content_and_status_class() {
    let (store, a, b, _) = store_with_duplicates().await;

    let groups = find_duplicate_groups(&store).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].target, a, "tie on references breaks to smallest id");
    assert_eq!(groups[0].sources, vec![b.clone()]);

    // Closing one member moves it to the other status class: no group.
    store.close(&b, None).await.unwrap();
    assert!(find_duplicate_groups(&store).await.is_empty());
}

#[tokio::test]
async fn target_selection_prefers_most_referenced() {
    let (store, a, b, c) = store_with_duplicates().await;
    // Point the bystander at bd-bbbb, making it the better-known copy.
    store
        .add_dependency(&c, &b, DependencyType::Related)
        .await
        .unwrap();

    let groups = find_duplicate_groups(&store).await;
    assert_eq!(groups[0].target, b);
    assert_eq!(groups[0].sources, vec![a]);
}

#[tokio::test]
async fn merge_migrates_edges_and_closes_sources() {
    let (store, a, b, c) = store_with_duplicates().await;
    store
        .add_dependency(&c, &b, DependencyType::Blocks)
        .await
        .unwrap();

    let report = merge_issues(&store, &[b.clone()], &a, false).await.unwrap();
    assert_eq!(report.merged, vec![b.clone()]);
    assert_eq!(report.migrated_edges, 1);

    let source = store.get(&b).await.unwrap();
    assert_eq!(source.status, IssueStatus::Closed);
    assert_eq!(source.close_reason.as_deref(), Some("Duplicate of bd-aaaa"));

    // The bystander's edge now points at the target, not the source.
    let deps = store.dependencies_of(&c).await.unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].to_id, a);
    assert!(store.dependents_of(&b).await.unwrap().is_empty());

    // Textual reference in the bystander was rewritten.
    let bystander = store.get(&c).await.unwrap();
    assert!(bystander.description.contains("bd-aaaa"));
    assert!(!bystander.description.contains("bd-bbbb"));
}

#[tokio::test]
async fn merge_is_idempotent() {
    let (store, a, b, c) = store_with_duplicates().await;
    store
        .add_dependency(&c, &b, DependencyType::Blocks)
        .await
        .unwrap();

    merge_issues(&store, &[b.clone()], &a, false).await.unwrap();
    let second = merge_issues(&store, &[b.clone()], &a, false).await.unwrap();

    assert!(second.merged.is_empty(), "source already closed");
    assert_eq!(second.migrated_edges, 0, "no edges left to move");

    // Still exactly one edge, no duplicates introduced.
    let deps = store.dependencies_of(&c).await.unwrap();
    assert_eq!(deps.len(), 1);
}

#[tokio::test]
async fn merge_into_itself_fails() {
    let (store, a, _, _) = store_with_duplicates().await;
    let err = merge_issues(&store, &[a.clone()], &a, false).await.unwrap_err();
    assert!(matches!(err, Error::Graph(GraphError::SelfMerge(_))));
}

#[tokio::test]
async fn dry_run_reports_without_mutating() {
    let (store, a, b, c) = store_with_duplicates().await;
    store
        .add_dependency(&c, &b, DependencyType::Blocks)
        .await
        .unwrap();

    let report = merge_issues(&store, &[b.clone()], &a, true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.merged, vec![b.clone()]);
    assert_eq!(report.migrated_edges, 1);

    // Nothing actually changed.
    let source = store.get(&b).await.unwrap();
    assert_eq!(source.status, IssueStatus::Open);
    let deps = store.dependencies_of(&c).await.unwrap();
    assert_eq!(deps[0].to_id, b);
}

#[tokio::test]
async fn merge_deduplicates_converging_edges() {
    let store = Store::in_memory("bd");
    let lines = [
        r#"{"id":"bd-aaaa","title":"Dup","description":"x"}"#,
        r#"{"id":"bd-bbbb","title":"Dup","description":"x"}"#,
        r#"{"id":"bd-cccc","title":"Waiter","description":""}"#,
        r#"{"from_id":"bd-cccc","to_id":"bd-aaaa","dep_type":"blocks"}"#,
        r#"{"from_id":"bd-cccc","to_id":"bd-bbbb","dep_type":"blocks"}"#,
    ];
    let records = lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    store
        .import_batch(RecordBatch {
            records,
            warnings: Vec::new(),
        })
        .await;

    let a = IssueId::new("bd-aaaa");
    let b = IssueId::new("bd-bbbb");
    let c = IssueId::new("bd-cccc");

    let report = merge_issues(&store, &[b], &a, false).await.unwrap();
    assert_eq!(report.dropped_edges, 1, "second edge would duplicate the first");

    let deps = store.dependencies_of(&c).await.unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].to_id, a);
}

#[tokio::test]
async fn missing_ids_are_reported() {
    let (store, a, _, _) = store_with_duplicates().await;
    let ghost = IssueId::new("bd-9999");

    let err = merge_issues(&store, &[ghost.clone()], &a, false).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = merge_issues(&store, &[a], &ghost, false).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn closed_duplicates_group_separately_from_open_ones() {
    let store = Store::in_memory("bd");
    let lines = [
        r#"{"id":"bd-aaaa","title":"Same","status":"closed"}"#,
        r#"{"id":"bd-bbbb","title":"Same","status":"closed"}"#,
        r#"{"id":"bd-cccc","title":"Same","status":"open"}"#,
    ];
    let records = lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    store
        .import_batch(RecordBatch {
            records,
            warnings: Vec::new(),
        })
        .await;

    let groups = find_duplicate_groups(&store).await;
    assert_eq!(groups.len(), 1, "closed pair groups; open singleton does not");
    assert_eq!(groups[0].target.as_str(), "bd-aaaa");
}

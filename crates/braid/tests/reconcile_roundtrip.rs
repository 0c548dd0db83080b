//! Integration tests for export/import reconciliation.

use braid::domain::{DependencyType, IssueFilter, IssueStatus, IssueUpdate, NewIssue};
use braid::reconcile::{self, ImportWarning, Reconciler};
use braid::store::Store;
use tempfile::TempDir;

async fn seeded_store(dir: &TempDir) -> Store {
    let path = dir.path().join("issues.jsonl");
    let (store, _) = Store::open(path, "bd").await.unwrap();

    let db = store.create(NewIssue::titled("Set up DB")).await.unwrap();
    let api = store.create(NewIssue::titled("Build API")).await.unwrap();
    store
        .add_dependency(&api.id, &db.id, DependencyType::Blocks)
        .await
        .unwrap();
    store.save().await.unwrap();
    store
}

#[tokio::test]
async fn export_import_export_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;
    let path = store.path().unwrap().to_path_buf();

    let first = tokio::fs::read(&path).await.unwrap();

    // Reopen from disk (a full import) and export again.
    let (reopened, report) = Store::open(&path, "bd").await.unwrap();
    assert!(report.warnings.is_empty());
    reopened.save().await.unwrap();

    let second = tokio::fs::read(&path).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn import_of_own_export_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;
    let path = store.path().unwrap().to_path_buf();

    let batch = reconcile::read_records(&path).await.unwrap();
    let report = store.import_batch(batch).await;

    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 0);
    assert_eq!(report.unchanged, 2);
    assert!(!report.changed());
}

#[tokio::test]
async fn orphaned_child_gets_a_tombstone_parent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("issues.jsonl");
    braid_jsonl::write_raw_lines_atomic(
        &path,
        &[r#"{"id":"bd-e1a0.1","title":"Orphaned child"}"#],
    )
    .await
    .unwrap();

    let (store, report) = Store::open(&path, "bd").await.unwrap();

    assert_eq!(report.tombstones.len(), 1);
    assert_eq!(report.tombstones[0].as_str(), "bd-e1a0");

    let parent = store.get(&"bd-e1a0".into()).await.unwrap();
    assert_eq!(parent.status, IssueStatus::Closed);
    assert_eq!(parent.priority, 4);
    assert!(parent.title.starts_with("[reconstructed]"));

    let child = store.get(&"bd-e1a0.1".into()).await.unwrap();
    assert_eq!(child.epic_id, Some(parent.id.clone()));

    let tree = store.build_tree(&parent.id, None).await.unwrap();
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].issue.id, child.id);
}

#[tokio::test]
async fn deeply_orphaned_child_reconstructs_the_whole_chain() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("issues.jsonl");
    braid_jsonl::write_raw_lines_atomic(
        &path,
        &[r#"{"id":"bd-e1a0.2.3","title":"Grandchild"}"#],
    )
    .await
    .unwrap();

    let (store, report) = Store::open(&path, "bd").await.unwrap();
    assert_eq!(report.tombstones.len(), 2);
    assert!(store.get(&"bd-e1a0".into()).await.is_some());
    assert!(store.get(&"bd-e1a0.2".into()).await.is_some());

    let middle = store.get(&"bd-e1a0.2".into()).await.unwrap();
    assert_eq!(middle.epic_id, Some("bd-e1a0".into()));
}

#[tokio::test]
async fn import_can_introduce_a_cycle_and_audit_finds_it() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("issues.jsonl");
    braid_jsonl::write_raw_lines_atomic(
        &path,
        &[
            r#"{"id":"bd-aaaa","title":"A"}"#,
            r#"{"id":"bd-bbbb","title":"B"}"#,
            r#"{"from_id":"bd-aaaa","to_id":"bd-bbbb","dep_type":"blocks"}"#,
            r#"{"from_id":"bd-bbbb","to_id":"bd-aaaa","dep_type":"blocks"}"#,
        ],
    )
    .await
    .unwrap();

    let (store, report) = Store::open(&path, "bd").await.unwrap();
    assert_eq!(report.edges_added, 2, "import bypasses the insertion guard");

    let cycles = store.detect_cycles().await;
    assert_eq!(cycles.len(), 1);
    let cycle = &cycles[0];
    assert_eq!(cycle.len(), 2);
    assert_eq!(cycle[0].as_str(), "bd-aaaa", "cycle is rotated to smallest id");
}

#[tokio::test]
async fn acyclic_graph_audits_clean() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;
    assert!(store.detect_cycles().await.is_empty());
}

#[tokio::test]
async fn import_rejects_invalid_status_transition_loudly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("issues.jsonl");
    let (store, _) = Store::open(&path, "bd").await.unwrap();

    let issue = store.create(NewIssue::titled("Archive me")).await.unwrap();
    store.close(&issue.id, None).await.unwrap();
    store
        .update(
            &issue.id,
            IssueUpdate {
                status: Some(IssueStatus::Archived),
                ..IssueUpdate::default()
            },
        )
        .await
        .unwrap();
    store.save().await.unwrap();

    // A record claiming the archived issue is suddenly in_progress.
    let line = format!(
        r#"{{"id":"{}","title":"Archive me","status":"in_progress"}}"#,
        issue.id
    );
    braid_jsonl::write_raw_lines_atomic(&path, &[line]).await.unwrap();

    let batch = reconcile::read_records(&path).await.unwrap();
    let report = store.import_batch(batch).await;

    assert!(report.warnings.iter().any(|w| matches!(
        w,
        ImportWarning::InvalidTransition { to: IssueStatus::InProgress, .. }
    )));
    let kept = store.get(&issue.id).await.unwrap();
    assert_eq!(kept.status, IssueStatus::Archived, "bad transition not applied");
}

#[tokio::test]
async fn import_updates_fields_and_bumps_updated_at() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("issues.jsonl");
    let (store, _) = Store::open(&path, "bd").await.unwrap();
    let issue = store.create(NewIssue::titled("Original")).await.unwrap();
    store.save().await.unwrap();

    let line = format!(
        r#"{{"id":"{}","title":"Original","description":"now with details","priority":1}}"#,
        issue.id
    );
    braid_jsonl::write_raw_lines_atomic(&path, &[line]).await.unwrap();

    let batch = reconcile::read_records(&path).await.unwrap();
    let report = store.import_batch(batch).await;
    assert_eq!(report.updated, 1);

    let updated = store.get(&issue.id).await.unwrap();
    assert_eq!(updated.description, "now with details");
    assert_eq!(updated.priority, 1);
    assert!(updated.updated_at > issue.updated_at);
    assert_eq!(updated.created_at, issue.created_at, "created_at is immutable");
}

#[tokio::test]
async fn dependency_to_missing_target_is_dropped_with_warning() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("issues.jsonl");
    braid_jsonl::write_raw_lines_atomic(
        &path,
        &[
            r#"{"id":"bd-aaaa","title":"A"}"#,
            r#"{"from_id":"bd-aaaa","to_id":"bd-gone","dep_type":"blocks"}"#,
        ],
    )
    .await
    .unwrap();

    let (store, report) = Store::open(&path, "bd").await.unwrap();
    assert_eq!(report.edges_added, 0);
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        ImportWarning::UnknownDependencyTarget { .. }
    )));
    assert!(store.dependencies_of(&"bd-aaaa".into()).await.unwrap().is_empty());
}

#[tokio::test]
async fn dependency_resolves_against_records_later_in_the_batch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("issues.jsonl");
    // Edge line appears before either endpoint's issue line.
    braid_jsonl::write_raw_lines_atomic(
        &path,
        &[
            r#"{"from_id":"bd-aaaa","to_id":"bd-bbbb","dep_type":"blocks"}"#,
            r#"{"id":"bd-bbbb","title":"B"}"#,
            r#"{"id":"bd-aaaa","title":"A"}"#,
        ],
    )
    .await
    .unwrap();

    let (store, report) = Store::open(&path, "bd").await.unwrap();
    assert_eq!(report.edges_added, 1);
    assert_eq!(
        store.dependencies_of(&"bd-aaaa".into()).await.unwrap().len(),
        1
    );
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn unknown_record_fields_survive_a_full_cycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("issues.jsonl");
    braid_jsonl::write_raw_lines_atomic(
        &path,
        &[r#"{"id":"bd-aaaa","title":"A","x_agent_meta":{"run":42}}"#],
    )
    .await
    .unwrap();

    let (store, _) = Store::open(&path, "bd").await.unwrap();
    store.save().await.unwrap();

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(content.contains("x_agent_meta"));
    assert!(content.contains("42"));
}

#[tokio::test]
async fn full_cycle_outside_git_degrades_to_export_import() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;
    let path = store.path().unwrap().to_path_buf();

    let reconciler = Reconciler::new(store.clone(), dir.path().to_path_buf(), path);
    let report = reconciler.run_cycle().await.unwrap();

    assert_eq!(report.exported, 2);
    assert!(!report.committed);
    assert!(!report.pushed);
    assert!(!report.import.changed());
    assert!(!report.export_hash.is_empty());

    // A second cycle over unchanged data produces the identical hash.
    let again = reconciler.run_cycle().await.unwrap();
    assert_eq!(report.export_hash, again.export_hash);
}

#[tokio::test]
async fn cycle_picks_up_direct_file_edits() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;
    let path = store.path().unwrap().to_path_buf();

    // Another process (a different branch, another agent) appends an issue.
    let mut content = tokio::fs::read_to_string(&path).await.unwrap();
    content.push_str("{\"id\":\"bd-ffff\",\"title\":\"From elsewhere\"}\n");
    tokio::fs::write(&path, content).await.unwrap();

    let reconciler = Reconciler::new(store.clone(), dir.path().to_path_buf(), path);
    reconciler.run_cycle().await.unwrap();

    assert!(store.get(&"bd-ffff".into()).await.is_some());
    let all = store.list(&IssueFilter::default()).await;
    assert_eq!(all.len(), 3);
}

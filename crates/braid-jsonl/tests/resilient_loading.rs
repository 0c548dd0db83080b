//! Integration tests for resilient JSONL loading against real files.

use braid_jsonl::{Warning, read_jsonl_resilient, write_jsonl_atomic, write_raw_lines_atomic};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Record {
    id: String,
    title: String,
}

fn record(id: &str, title: &str) -> Record {
    Record {
        id: id.to_string(),
        title: title.to_string(),
    }
}

#[tokio::test]
async fn corrupted_middle_line_loses_only_that_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.jsonl");

    write_raw_lines_atomic(
        &path,
        &[
            r#"{"id":"bd-1","title":"first"}"#,
            r#"{"id":"bd-2","title": TRUNCATED"#,
            r#"{"id":"bd-3","title":"third"}"#,
        ],
    )
    .await
    .unwrap();

    let (records, warnings) = read_jsonl_resilient::<Record, _>(&path).await.unwrap();
    assert_eq!(records, vec![record("bd-1", "first"), record("bd-3", "third")]);
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        warnings[0],
        Warning::MalformedJson { line_number: 2, .. }
    ));
}

#[tokio::test]
async fn torn_tail_line_from_interrupted_append_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.jsonl");

    write_jsonl_atomic(&path, &[record("bd-1", "kept")]).await.unwrap();

    // Simulate a crash mid-append: a partial record with no closing brace.
    let mut content = tokio::fs::read_to_string(&path).await.unwrap();
    content.push_str("{\"id\":\"bd-2\",\"ti");
    tokio::fs::write(&path, content).await.unwrap();

    let (records, warnings) = read_jsonl_resilient::<Record, _>(&path).await.unwrap();
    assert_eq!(records, vec![record("bd-1", "kept")]);
    assert_eq!(warnings.len(), 1);
}

#[tokio::test]
async fn write_read_write_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.jsonl");

    let records = vec![record("bd-1", "a"), record("bd-2", "b")];
    write_jsonl_atomic(&path, &records).await.unwrap();
    let first = tokio::fs::read(&path).await.unwrap();

    let (reread, _) = read_jsonl_resilient::<Record, _>(&path).await.unwrap();
    write_jsonl_atomic(&path, &reread).await.unwrap();
    let second = tokio::fs::read(&path).await.unwrap();

    assert_eq!(first, second);
}

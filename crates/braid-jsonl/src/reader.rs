//! Resilient JSONL reading.
//!
//! Reading never fails on a bad *line*; only IO errors abort the read.
//! Each unparseable line becomes a [`Warning`] so the caller can report
//! corruption without losing the rest of the database.

use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::Result;
use crate::warning::Warning;

/// Read a JSONL file, skipping lines that fail to parse.
///
/// Returns the successfully parsed records in file order together with one
/// [`Warning`] per skipped line. Empty and whitespace-only lines are ignored
/// silently. A missing file is an IO error; callers that treat a missing
/// file as an empty database check existence first.
///
/// # Errors
///
/// Returns an error only if the file cannot be opened or read.
pub async fn read_jsonl_resilient<T, P>(path: P) -> Result<(Vec<T>, Vec<Warning>)>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref()).await?;
    let mut lines = BufReader::new(file).lines();

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!(line_number, "skipping unparseable JSONL line: {e}");
                warnings.push(Warning::MalformedJson {
                    line_number,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok((records, warnings))
}

/// Read a JSONL file as raw trimmed lines, without parsing.
///
/// Used when the caller wants to diff or re-emit records byte-for-byte.
/// Empty lines are dropped.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn read_raw_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let file = File::open(path.as_ref()).await?;
    let mut lines = BufReader::new(file).lines();

    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rec {
        id: String,
    }

    async fn write_fixture(content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("data.jsonl"), content)
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn reads_well_formed_lines() {
        let dir = write_fixture("{\"id\":\"a\"}\n{\"id\":\"b\"}\n").await;
        let (records, warnings) = read_jsonl_resilient::<Rec, _>(dir.path().join("data.jsonl"))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(warnings.is_empty());
        assert_eq!(records[0].id, "a");
    }

    #[tokio::test]
    async fn malformed_line_becomes_warning() {
        let dir = write_fixture("{\"id\":\"a\"}\nnot json at all\n{\"id\":\"c\"}\n").await;
        let (records, warnings) = read_jsonl_resilient::<Rec, _>(dir.path().join("data.jsonl"))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line_number(), 2);
    }

    #[tokio::test]
    async fn blank_lines_are_ignored_silently() {
        let dir = write_fixture("\n{\"id\":\"a\"}\n\n   \n").await;
        let (records, warnings) = read_jsonl_resilient::<Rec, _>(dir.path().join("data.jsonl"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn raw_lines_preserve_record_text() {
        let dir = write_fixture("{\"id\":\"a\",\"extra\":1}\n\n{\"id\":\"b\"}\n").await;
        let lines = read_raw_lines(dir.path().join("data.jsonl")).await.unwrap();
        assert_eq!(lines, vec!["{\"id\":\"a\",\"extra\":1}", "{\"id\":\"b\"}"]);
    }
}

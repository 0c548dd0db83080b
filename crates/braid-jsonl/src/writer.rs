//! Atomic JSONL writing.
//!
//! Full rewrites go through the temp-file-then-rename pattern: renames within
//! one filesystem are atomic on POSIX, so a crash mid-write leaves the
//! original file untouched. The temp file may be left behind; the next
//! successful write replaces it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;

/// Atomically replace `path` with one JSON line per value.
///
/// # Errors
///
/// Returns an error if serialization fails, the temp file cannot be written,
/// or the final rename fails. On failure the original file is unchanged and
/// the temp file is removed best-effort.
pub async fn write_jsonl_atomic<T, P>(path: P, values: &[T]) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let mut lines = Vec::with_capacity(values.len());
    for value in values {
        lines.push(serde_json::to_string(value)?);
    }
    write_raw_lines_atomic(path, &lines).await
}

/// Atomically replace `path` with the given pre-serialized lines.
///
/// Each string is written verbatim followed by a newline; callers use this
/// when they need byte-identical round-tripping of records they did not
/// produce themselves.
///
/// # Errors
///
/// Returns an error if the temp file cannot be written or the rename fails.
pub async fn write_raw_lines_atomic<P, S>(path: P, lines: &[S]) -> Result<()>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    let temp_path = make_temp_path(path);

    let write_result = async {
        let file = File::create(&temp_path).await?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writer.write_all(line.as_ref().as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok::<(), crate::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Append a single record to a JSONL file, creating it if absent.
///
/// Appends are not atomic; they are used for journaling where a torn tail
/// line is tolerated by the resilient reader.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn append_jsonl<T, P>(path: P, value: &T) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Temp path used during atomic writes: `issues.jsonl` -> `issues.jsonl.tmp`.
fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_os_string();
    temp.push(".tmp");
    PathBuf::from(temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Rec {
        id: String,
        n: u32,
    }

    #[tokio::test]
    async fn atomic_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let records = vec![
            Rec {
                id: "a".into(),
                n: 1,
            },
            Rec {
                id: "b".into(),
                n: 2,
            },
        ];
        write_jsonl_atomic(&path, &records).await.unwrap();

        let (read, warnings) = crate::read_jsonl_resilient::<Rec, _>(&path).await.unwrap();
        assert_eq!(read, records);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn atomic_write_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        write_jsonl_atomic(
            &path,
            &[Rec {
                id: "old".into(),
                n: 1,
            }],
        )
        .await
        .unwrap();
        write_jsonl_atomic(
            &path,
            &[Rec {
                id: "new".into(),
                n: 2,
            }],
        )
        .await
        .unwrap();

        let (read, _) = crate::read_jsonl_resilient::<Rec, _>(&path).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, "new");
    }

    #[tokio::test]
    async fn append_adds_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");

        append_jsonl(
            &path,
            &Rec {
                id: "a".into(),
                n: 1,
            },
        )
        .await
        .unwrap();
        append_jsonl(
            &path,
            &Rec {
                id: "b".into(),
                n: 2,
            },
        )
        .await
        .unwrap();

        let (read, _) = crate::read_jsonl_resilient::<Rec, _>(&path).await.unwrap();
        assert_eq!(read.len(), 2);
    }

    #[test]
    fn temp_path_appends_tmp_suffix() {
        let p = make_temp_path(Path::new("/x/issues.jsonl"));
        assert_eq!(p, Path::new("/x/issues.jsonl.tmp"));
    }
}

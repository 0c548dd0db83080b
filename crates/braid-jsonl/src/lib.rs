//! Line-delimited JSON reading and writing for the braid issue tracker.
//!
//! The interchange file braid keeps under version control is JSONL: one JSON
//! record per line. This crate provides the two primitives the tracker needs
//! from that format:
//!
//! - **Resilient reading**: a corrupted or hand-edited line must never make
//!   the whole database unreadable. Malformed lines are reported as
//!   [`Warning`]s and skipped.
//! - **Atomic writing**: the file is rewritten via the temp-file-then-rename
//!   pattern so a crash mid-write leaves the previous contents intact.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod reader;
pub mod warning;
pub mod writer;

pub use error::{Error, Result};
pub use reader::{read_jsonl_resilient, read_raw_lines};
pub use warning::Warning;
pub use writer::{append_jsonl, write_jsonl_atomic, write_raw_lines_atomic};

//! Interchange records: the line-delimited JSON contract with git.
//!
//! A line is either an issue record or a raw dependency-edge record; the
//! two are told apart structurally (an edge carries `from_id`/`to_id`, an
//! issue carries `id`/`title`). Known fields are validated and typed at
//! this boundary; unknown fields ride along opaquely in a flattened map
//! and are re-emitted on export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Dependency, DependencyType, Issue, IssueId, IssueStatus, IssueType};

/// One line of the interchange file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    /// A raw dependency edge.
    Dependency(DependencyRecord),
    /// An issue. Tried second: issue lines lack `from_id`/`to_id`.
    Issue(IssueRecord),
}

/// Issue record as serialized on disk. Only `id` and `title` are required;
/// everything else defaults so partial records written by other tools
/// still import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    /// Issue id.
    pub id: IssueId,

    /// Title.
    pub title: String,

    /// Description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Status, serialized as the enum name.
    #[serde(default = "default_status")]
    pub status: IssueStatus,

    /// Priority 0-4.
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Issue type.
    #[serde(default = "default_issue_type")]
    pub issue_type: IssueType,

    /// Owning epic (mirror of the canonical parent-child edge).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<IssueId>,

    /// Assignee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Close reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,

    /// Creation timestamp (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last-update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Close timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Fields this version of braid does not know about, preserved as-is.
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

fn default_status() -> IssueStatus {
    IssueStatus::Open
}

fn default_priority() -> u8 {
    2
}

fn default_issue_type() -> IssueType {
    IssueType::Task
}

impl IssueRecord {
    /// Build the on-disk record for an issue.
    #[must_use]
    pub fn from_issue(issue: &Issue) -> Self {
        Self {
            id: issue.id.clone(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            status: issue.status,
            priority: issue.priority,
            issue_type: issue.issue_type,
            epic_id: issue.epic_id.clone(),
            assignee: issue.assignee.clone(),
            labels: issue.labels.clone(),
            close_reason: issue.close_reason.clone(),
            created_at: Some(issue.created_at),
            updated_at: Some(issue.updated_at),
            closed_at: issue.closed_at,
            extra: issue.extra.clone(),
        }
    }

    /// Materialize an [`Issue`] from this record.
    ///
    /// Missing timestamps default to `now`; `closed_at` is forced
    /// consistent with the status either way.
    #[must_use]
    pub fn into_issue(self, now: DateTime<Utc>) -> Issue {
        let created_at = self.created_at.unwrap_or(now);
        let updated_at = self.updated_at.unwrap_or(now);
        let closed = matches!(self.status, IssueStatus::Closed | IssueStatus::Archived);
        let closed_at = if closed {
            self.closed_at.or(Some(updated_at))
        } else {
            None
        };

        Issue {
            id: self.id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            issue_type: self.issue_type,
            epic_id: self.epic_id,
            assignee: self.assignee,
            labels: self.labels,
            close_reason: self.close_reason,
            created_at,
            updated_at,
            closed_at,
            extra: self.extra,
        }
    }
}

/// Dependency edge record as serialized on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Dependent issue id.
    pub from_id: IssueId,

    /// Target issue id.
    pub to_id: IssueId,

    /// Edge type.
    pub dep_type: DependencyType,

    /// When the edge was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl DependencyRecord {
    /// Build the on-disk record for an edge.
    #[must_use]
    pub fn from_dependency(dep: &Dependency) -> Self {
        Self {
            from_id: dep.from_id.clone(),
            to_id: dep.to_id.clone(),
            dep_type: dep.dep_type,
            created_at: Some(dep.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_dependency_lines_are_told_apart() {
        let issue: Record =
            serde_json::from_str(r#"{"id":"bd-a3f8","title":"Set up DB"}"#).unwrap();
        assert!(matches!(issue, Record::Issue(_)));

        let dep: Record = serde_json::from_str(
            r#"{"from_id":"bd-1111","to_id":"bd-2222","dep_type":"blocks"}"#,
        )
        .unwrap();
        assert!(matches!(dep, Record::Dependency(_)));
    }

    #[test]
    fn partial_issue_record_fills_defaults() {
        let record: IssueRecord =
            serde_json::from_str(r#"{"id":"bd-a3f8","title":"Minimal"}"#).unwrap();
        assert_eq!(record.status, IssueStatus::Open);
        assert_eq!(record.priority, 2);
        assert_eq!(record.issue_type, IssueType::Task);

        let issue = record.into_issue(Utc::now());
        assert!(issue.closed_at.is_none());
    }

    #[test]
    fn unknown_fields_round_trip() {
        let line = r#"{"id":"bd-a3f8","title":"T","x_custom":{"nested":true}}"#;
        let record: IssueRecord = serde_json::from_str(line).unwrap();
        assert!(record.extra.contains_key("x_custom"));

        let out = serde_json::to_string(&record).unwrap();
        assert!(out.contains("x_custom"));
        assert!(out.contains("nested"));
    }

    #[test]
    fn closed_status_without_timestamp_gets_one() {
        let record: IssueRecord = serde_json::from_str(
            r#"{"id":"bd-a3f8","title":"Done","status":"closed"}"#,
        )
        .unwrap();
        let issue = record.into_issue(Utc::now());
        assert!(issue.closed_at.is_some());
    }
}

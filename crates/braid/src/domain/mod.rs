//! Domain types for the braid issue tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::ValidationError;

/// Maximum title length accepted by validation.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Lowest (most urgent) priority value.
pub const MIN_PRIORITY: u8 = 0;

/// Highest (least urgent) priority value.
pub const MAX_PRIORITY: u8 = 4;

/// Maximum number of dotted hierarchy levels below a root id.
pub const MAX_HIERARCHY_DEPTH: usize = 3;

/// Unique identifier for an issue.
///
/// Base ids are `{prefix}-{hash}`; hierarchical children append dotted
/// numeric suffixes (`bd-a3f8.1`, `bd-a3f8.1.2`), at most
/// [`MAX_HIERARCHY_DEPTH`] levels deep.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueId(pub String);

impl IssueId {
    /// Create a new issue ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parent id of a hierarchical child (`bd-a3f8.1.2` -> `bd-a3f8.1`).
    #[must_use]
    pub fn parent(&self) -> Option<IssueId> {
        self.0.rsplit_once('.').and_then(|(head, tail)| {
            tail.parse::<u32>().ok().map(|_| IssueId::new(head))
        })
    }

    /// Number of dotted hierarchy levels below the root id.
    #[must_use]
    pub fn depth(&self) -> usize {
        let Some((_, suffix)) = self.0.split_once('.') else {
            return 0;
        };
        1 + suffix.matches('.').count()
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IssueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Ready to be picked up.
    Open,

    /// Currently being worked on.
    InProgress,

    /// Waiting on a blocking dependency.
    Blocked,

    /// Work finished, awaiting closure.
    Resolved,

    /// Done.
    Closed,

    /// Closed and hidden from normal listings.
    Archived,
}

impl IssueStatus {
    /// Whether an issue in this status discharges `blocks` edges pointing
    /// at it: closed and resolved blockers no longer block.
    #[must_use]
    pub fn resolves_blocking(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::Archived)
    }

    /// Whether this status counts as "open" for duplicate grouping and
    /// readiness queries.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::InProgress | Self::Blocked)
    }

    /// Whether `self -> to` is an allowed status transition.
    ///
    /// Same-status updates are always allowed (field-only edits).
    #[must_use]
    pub fn can_transition_to(self, to: IssueStatus) -> bool {
        use IssueStatus::{Archived, Blocked, Closed, InProgress, Open, Resolved};
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Open, InProgress | Blocked | Resolved | Closed)
                | (InProgress, Open | Blocked | Resolved | Closed)
                | (Blocked, Open | InProgress | Resolved | Closed)
                | (Resolved, Open | Closed)
                | (Closed, Open | Archived)
                | (Archived, Open)
        )
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Archived => "archived",
        };
        f.write_str(name)
    }
}

/// Type of issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    /// Bug fix.
    Bug,

    /// New feature.
    Feature,

    /// General task.
    Task,

    /// Parent issue owning hierarchical children.
    Epic,

    /// Maintenance work.
    Chore,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Task => "task",
            Self::Epic => "epic",
            Self::Chore => "chore",
        };
        f.write_str(name)
    }
}

/// Type of dependency relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    /// Hard blocker: the target must resolve before the source is ready.
    Blocks,

    /// Informational link.
    Related,

    /// Hierarchical child -> epic relation.
    ParentChild,

    /// The source was discovered while working on the target.
    DiscoveredFrom,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blocks => "blocks",
            Self::Related => "related",
            Self::ParentChild => "parent-child",
            Self::DiscoveredFrom => "discovered-from",
        };
        f.write_str(name)
    }
}

/// A directed, typed edge between two issues.
///
/// Edges point from the dependent to the dependency: `from` is blocked by
/// `to`, a child points at its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// The dependent issue.
    pub from_id: IssueId,

    /// The issue being depended on.
    pub to_id: IssueId,

    /// Kind of relationship.
    pub dep_type: DependencyType,

    /// When the edge was created.
    pub created_at: DateTime<Utc>,
}

/// An issue: a node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier.
    pub id: IssueId,

    /// One-line summary.
    pub title: String,

    /// Free-form description, not interpreted by the core.
    #[serde(default)]
    pub description: String,

    /// Current status.
    pub status: IssueStatus,

    /// Priority, 0 (most urgent) to 4.
    pub priority: u8,

    /// Issue type.
    pub issue_type: IssueType,

    /// Owning epic, derived from the canonical `parent-child` edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<IssueId>,

    /// Assignee username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Why the issue was closed, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,

    /// Close timestamp; set exactly while status is closed/archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Interchange fields this version of braid does not understand,
    /// carried opaquely so they survive a round-trip through the store.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Issue {
    /// Content hash over the defining fields, used for content-addressed
    /// ids and duplicate detection.
    ///
    /// Priority and labels are excluded so routine triage edits do not
    /// change an issue's identity.
    #[must_use]
    pub fn content_hash(&self) -> String {
        content_hash(&self.title, &self.description, self.issue_type)
    }
}

/// Content hash over an issue's defining fields (SHA-256, lowercase hex).
#[must_use]
pub fn content_hash(title: &str, description: &str, issue_type: IssueType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(description.as_bytes());
    hasher.update([0x1f]);
    hasher.update(issue_type.to_string().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Validate a title: non-empty after trimming, at most [`MAX_TITLE_LENGTH`].
///
/// # Errors
///
/// Returns [`ValidationError::EmptyTitle`] or [`ValidationError::TitleTooLong`].
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong {
            max: MAX_TITLE_LENGTH,
        });
    }
    Ok(())
}

/// Data for creating a new issue.
#[derive(Debug, Clone)]
pub struct NewIssue {
    /// Issue title.
    pub title: String,

    /// Description.
    pub description: String,

    /// Priority 0-4.
    pub priority: u8,

    /// Issue type.
    pub issue_type: IssueType,

    /// Owning epic; the new issue gets a hierarchical child id and a
    /// `parent-child` edge to it.
    pub epic: Option<IssueId>,

    /// Assignee.
    pub assignee: Option<String>,

    /// Labels.
    pub labels: Vec<String>,

    /// Initial dependencies as `(target, type)` pairs.
    pub dependencies: Vec<(IssueId, DependencyType)>,
}

impl NewIssue {
    /// A task-typed issue with just a title, defaults elsewhere.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: 2,
            issue_type: IssueType::Task,
            epic: None,
            assignee: None,
            labels: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Validate field invariants before id generation.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for bad titles or priorities.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        if self.priority > MAX_PRIORITY {
            return Err(ValidationError::InvalidPriority(self.priority));
        }
        Ok(())
    }
}

/// Field-level update for an existing issue. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    /// New title.
    pub title: Option<String>,

    /// New description.
    pub description: Option<String>,

    /// New status; validated against the transition matrix.
    pub status: Option<IssueStatus>,

    /// New priority.
    pub priority: Option<u8>,

    /// New assignee; `Some(None)` clears it.
    pub assignee: Option<Option<String>>,

    /// Replacement label set.
    pub labels: Option<Vec<String>>,

    /// Close reason, applied when the status change closes the issue.
    pub close_reason: Option<String>,
}

/// Conjunctive filter for issue queries.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    /// Match this status.
    pub status: Option<IssueStatus>,

    /// Match this priority.
    pub priority: Option<u8>,

    /// Match this issue type.
    pub issue_type: Option<IssueType>,

    /// Match this assignee.
    pub assignee: Option<String>,

    /// Require this label.
    pub label: Option<String>,

    /// Cap the number of results.
    pub limit: Option<usize>,
}

impl IssueFilter {
    /// Whether `issue` satisfies every set field.
    #[must_use]
    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(status) = self.status {
            if issue.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if issue.priority != priority {
                return false;
            }
        }
        if let Some(issue_type) = self.issue_type {
            if issue.issue_type != issue_type {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if issue.assignee.as_ref() != Some(assignee) {
                return false;
            }
        }
        if let Some(label) = &self.label {
            if !issue.labels.iter().any(|l| l == label) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn hierarchical_id_parent_and_depth() {
        let id = IssueId::new("bd-a3f8.1.2");
        assert_eq!(id.parent(), Some(IssueId::new("bd-a3f8.1")));
        assert_eq!(id.depth(), 2);

        let root = IssueId::new("bd-a3f8");
        assert_eq!(root.parent(), None);
        assert_eq!(root.depth(), 0);
    }

    #[test]
    fn prefixed_root_id_is_not_a_child() {
        // A dot only makes a child when the suffix is numeric.
        let id = IssueId::new("bd-a3f8.x");
        assert_eq!(id.parent(), None);
    }

    #[rstest]
    #[case(IssueStatus::Open, IssueStatus::InProgress, true)]
    #[case(IssueStatus::Open, IssueStatus::Closed, true)]
    #[case(IssueStatus::Closed, IssueStatus::Open, true)]
    #[case(IssueStatus::Closed, IssueStatus::Archived, true)]
    #[case(IssueStatus::Archived, IssueStatus::Closed, false)]
    #[case(IssueStatus::Resolved, IssueStatus::InProgress, false)]
    #[case(IssueStatus::Archived, IssueStatus::Open, true)]
    fn transition_matrix(
        #[case] from: IssueStatus,
        #[case] to: IssueStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn same_status_transition_is_allowed() {
        assert!(IssueStatus::Blocked.can_transition_to(IssueStatus::Blocked));
    }

    #[test]
    fn content_hash_is_deterministic_and_sensitive() {
        let a = content_hash("Fix login", "details", IssueType::Bug);
        let b = content_hash("Fix login", "details", IssueType::Bug);
        let c = content_hash("Fix login!", "details", IssueType::Bug);
        let d = content_hash("Fix login", "details", IssueType::Task);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn title_validation() {
        assert!(validate_title("ok").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&IssueStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let json = serde_json::to_string(&DependencyType::DiscoveredFrom).unwrap();
        assert_eq!(json, "\"discovered-from\"");
    }
}

//! Clap value-enum mirrors of the domain enums.
//!
//! Clap needs `ValueEnum` derives the domain types should not carry; each
//! mirror converts into its domain counterpart.

use clap::ValueEnum;

use crate::domain::{DependencyType, IssueStatus, IssueType};

/// CLI mirror of [`IssueStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IssueStatusArg {
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

impl From<IssueStatusArg> for IssueStatus {
    fn from(arg: IssueStatusArg) -> Self {
        match arg {
            IssueStatusArg::Open => Self::Open,
            IssueStatusArg::InProgress => Self::InProgress,
            IssueStatusArg::Blocked => Self::Blocked,
            IssueStatusArg::Resolved => Self::Resolved,
            IssueStatusArg::Closed => Self::Closed,
            IssueStatusArg::Archived => Self::Archived,
        }
    }
}

/// CLI mirror of [`IssueType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IssueTypeArg {
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

impl From<IssueTypeArg> for IssueType {
    fn from(arg: IssueTypeArg) -> Self {
        match arg {
            IssueTypeArg::Bug => Self::Bug,
            IssueTypeArg::Feature => Self::Feature,
            IssueTypeArg::Task => Self::Task,
            IssueTypeArg::Epic => Self::Epic,
            IssueTypeArg::Chore => Self::Chore,
        }
    }
}

/// CLI mirror of [`DependencyType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DependencyTypeArg {
    /// Hard blocker.
    Blocks,
    /// Informational link.
    Related,
    /// Hierarchical child -> epic relation.
    ParentChild,
    /// Found while working on the target.
    DiscoveredFrom,
}

impl From<DependencyTypeArg> for DependencyType {
    fn from(arg: DependencyTypeArg) -> Self {
        match arg {
            DependencyTypeArg::Blocks => Self::Blocks,
            DependencyTypeArg::Related => Self::Related,
            DependencyTypeArg::ParentChild => Self::ParentChild,
            DependencyTypeArg::DiscoveredFrom => Self::DiscoveredFrom,
        }
    }
}

//! Core store state: issues, the dependency graph, and mutations.
//!
//! Every mutation validates first and mutates second; a failed call leaves
//! the state observably unchanged. The graph uses petgraph's `DiGraph` with
//! edges directed dependent -> dependency (`from` is blocked by `to`, a
//! child points at its parent epic).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::domain::{
    Dependency, DependencyType, Issue, IssueId, IssueStatus, IssueType, IssueUpdate, NewIssue,
};
use crate::error::{Error, GraphError, Result, ValidationError};
use crate::identity::IdGenerator;

use super::algo;

/// Edge payload: the relationship kind plus when it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EdgeData {
    pub(crate) dep_type: DependencyType,
    pub(crate) created_at: DateTime<Utc>,
}

/// Inner storage structure, wrapped in `Arc<Mutex<..>>` by [`super::Store`].
#[derive(Debug)]
pub(crate) struct StoreInner {
    /// Issues indexed by id.
    pub(crate) issues: HashMap<IssueId, Issue>,

    /// Dependency graph; nodes carry ids, edges carry [`EdgeData`].
    pub(crate) graph: DiGraph<IssueId, EdgeData>,

    /// Id -> graph node lookup. Kept in step with `issues`.
    pub(crate) node_map: HashMap<IssueId, NodeIndex>,

    /// Generator tracking every id in the store.
    pub(crate) id_generator: IdGenerator,
}

impl StoreInner {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            issues: HashMap::new(),
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            id_generator: IdGenerator::new(prefix),
        }
    }

    /// Create a new issue. Re-submitting identical content returns the
    /// already-stored issue unchanged (id generation is content-addressed
    /// and idempotent).
    pub(crate) fn create(&mut self, new_issue: NewIssue) -> Result<Issue> {
        new_issue.validate()?;

        for (target, _) in &new_issue.dependencies {
            if !self.issues.contains_key(target) {
                return Err(Error::NotFound(target.to_string()));
            }
        }

        let id = match &new_issue.epic {
            Some(parent) => {
                let parent_issue = self
                    .issues
                    .get(parent)
                    .ok_or_else(|| Error::NotFound(parent.to_string()))?;
                if parent_issue.issue_type != IssueType::Epic {
                    return Err(ValidationError::NotAnEpic(parent.to_string()).into());
                }
                IssueId::new(self.id_generator.generate_child(parent.as_str())?)
            }
            None => {
                let id = IssueId::new(self.id_generator.generate(
                    &new_issue.title,
                    &new_issue.description,
                    new_issue.issue_type,
                )?);
                if let Some(existing) = self.issues.get(&id) {
                    return Ok(existing.clone());
                }
                id
            }
        };

        let now = Utc::now();
        let issue = Issue {
            id: id.clone(),
            title: new_issue.title,
            description: new_issue.description,
            status: IssueStatus::Open,
            priority: new_issue.priority,
            issue_type: new_issue.issue_type,
            epic_id: new_issue.epic.clone(),
            assignee: new_issue.assignee,
            labels: new_issue.labels,
            close_reason: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            extra: serde_json::Map::new(),
        };

        self.insert_issue(issue.clone());

        if let Some(parent) = &new_issue.epic {
            self.insert_edge(&id, parent, DependencyType::ParentChild, now);
        }
        for (target, dep_type) in new_issue.dependencies {
            // A brand-new node has no incoming edges, so its outgoing edges
            // cannot close a cycle; only dedupe is needed here.
            if !self.edge_exists(&id, &target, dep_type) {
                self.insert_edge(&id, &target, dep_type, now);
            }
        }

        Ok(issue)
    }

    /// Apply a field-level update.
    pub(crate) fn update(&mut self, id: &IssueId, updates: IssueUpdate) -> Result<Issue> {
        let current_status = self
            .issues
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?
            .status;

        // Validate the whole update before touching the issue.
        if let Some(title) = &updates.title {
            crate::domain::validate_title(title)?;
        }
        if let Some(priority) = updates.priority {
            if priority > crate::domain::MAX_PRIORITY {
                return Err(ValidationError::InvalidPriority(priority).into());
            }
        }
        if let Some(status) = updates.status {
            if !current_status.can_transition_to(status) {
                return Err(ValidationError::InvalidStatusTransition {
                    from: current_status,
                    to: status,
                }
                .into());
            }
        }

        let issue = self
            .issues
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if let Some(title) = updates.title {
            issue.title = title;
        }
        if let Some(description) = updates.description {
            issue.description = description;
        }
        if let Some(status) = updates.status {
            apply_status(issue, status, updates.close_reason);
        }
        if let Some(priority) = updates.priority {
            issue.priority = priority;
        }
        if let Some(assignee) = updates.assignee {
            issue.assignee = assignee;
        }
        if let Some(labels) = updates.labels {
            issue.labels = labels;
        }
        issue.updated_at = Utc::now();

        let updated = issue.clone();
        self.id_generator
            .register(updated.id.as_str(), updated.content_hash());
        Ok(updated)
    }

    /// Remove an issue, cascading every edge that touches it.
    pub(crate) fn remove(&mut self, id: &IssueId) -> Result<Issue> {
        let removed = self
            .issues
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Some(node) = self.node_map.remove(id) {
            self.graph.remove_node(node);
            // remove_node swaps the highest-index node into the vacated
            // slot; the map entry for that node must follow it.
            if let Some(moved) = self.graph.node_weight(node) {
                self.node_map.insert(moved.clone(), node);
            }
        }
        self.id_generator.unregister(id.as_str());

        // The hierarchy mirror must not dangle.
        for issue in self.issues.values_mut() {
            if issue.epic_id.as_ref() == Some(id) {
                issue.epic_id = None;
            }
        }

        Ok(removed)
    }

    /// Add a typed dependency edge.
    pub(crate) fn add_dependency(
        &mut self,
        from: &IssueId,
        to: &IssueId,
        dep_type: DependencyType,
    ) -> Result<()> {
        if from == to {
            return Err(GraphError::SelfDependency(from.to_string()).into());
        }
        if !self.issues.contains_key(from) {
            return Err(Error::NotFound(from.to_string()));
        }
        if !self.issues.contains_key(to) {
            return Err(Error::NotFound(to.to_string()));
        }
        if self.edge_exists(from, to, dep_type) {
            return Err(GraphError::DuplicateDependency {
                from: from.to_string(),
                to: to.to_string(),
                dep_type,
            }
            .into());
        }

        if dep_type == DependencyType::Blocks {
            // A path to -> ... -> from over blocks edges means the new edge
            // would close a cycle.
            let from_node = self.node_map[from];
            let to_node = self.node_map[to];
            if algo::blocks_path_exists(&self.graph, to_node, from_node) {
                return Err(GraphError::CycleDetected {
                    from: from.to_string(),
                    to: to.to_string(),
                }
                .into());
            }
        }

        if dep_type == DependencyType::ParentChild {
            let parent = self
                .issues
                .get(to)
                .ok_or_else(|| Error::NotFound(to.to_string()))?;
            if parent.issue_type != IssueType::Epic {
                return Err(ValidationError::NotAnEpic(to.to_string()).into());
            }
        }

        self.insert_edge(from, to, dep_type, Utc::now());

        if dep_type == DependencyType::ParentChild {
            if let Some(child) = self.issues.get_mut(from) {
                child.epic_id = Some(to.clone());
                child.updated_at = Utc::now();
            }
        }

        Ok(())
    }

    /// Remove a dependency edge. Idempotent: absent edges (or ids) are a
    /// no-op.
    pub(crate) fn remove_dependency(
        &mut self,
        from: &IssueId,
        to: &IssueId,
        dep_type: DependencyType,
    ) {
        let (Some(&from_node), Some(&to_node)) = (self.node_map.get(from), self.node_map.get(to))
        else {
            return;
        };

        let edge = self
            .graph
            .edges_connecting(from_node, to_node)
            .find(|e| e.weight().dep_type == dep_type)
            .map(|e| e.id());
        if let Some(edge) = edge {
            self.graph.remove_edge(edge);
            if dep_type == DependencyType::ParentChild {
                if let Some(child) = self.issues.get_mut(from) {
                    child.epic_id = None;
                    child.updated_at = Utc::now();
                }
            }
        }
    }

    /// Add a label if absent.
    pub(crate) fn add_label(&mut self, id: &IssueId, label: &str) -> Result<Issue> {
        let issue = self
            .issues
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if !issue.labels.iter().any(|l| l == label) {
            issue.labels.push(label.to_string());
            issue.updated_at = Utc::now();
        }
        Ok(issue.clone())
    }

    /// Remove a label if present.
    pub(crate) fn remove_label(&mut self, id: &IssueId, label: &str) -> Result<Issue> {
        let issue = self
            .issues
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let before = issue.labels.len();
        issue.labels.retain(|l| l != label);
        if issue.labels.len() != before {
            issue.updated_at = Utc::now();
        }
        Ok(issue.clone())
    }

    /// Outgoing edges of an issue.
    pub(crate) fn dependencies_of(&self, id: &IssueId) -> Result<Vec<Dependency>> {
        let node = self
            .node_map
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(self
            .graph
            .edges(*node)
            .map(|e| Dependency {
                from_id: id.clone(),
                to_id: self.graph[e.target()].clone(),
                dep_type: e.weight().dep_type,
                created_at: e.weight().created_at,
            })
            .collect())
    }

    /// Incoming edges of an issue.
    pub(crate) fn dependents_of(&self, id: &IssueId) -> Result<Vec<Dependency>> {
        let node = self
            .node_map
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(self
            .graph
            .edges_directed(*node, Direction::Incoming)
            .map(|e| Dependency {
                from_id: self.graph[e.source()].clone(),
                to_id: id.clone(),
                dep_type: e.weight().dep_type,
                created_at: e.weight().created_at,
            })
            .collect())
    }

    /// All edges, one [`Dependency`] per graph edge.
    pub(crate) fn all_dependencies(&self) -> Vec<Dependency> {
        self.graph
            .edge_references()
            .map(|e| Dependency {
                from_id: self.graph[e.source()].clone(),
                to_id: self.graph[e.target()].clone(),
                dep_type: e.weight().dep_type,
                created_at: e.weight().created_at,
            })
            .collect()
    }

    /// Whether the exact `(from, to, type)` triple exists.
    pub(crate) fn edge_exists(
        &self,
        from: &IssueId,
        to: &IssueId,
        dep_type: DependencyType,
    ) -> bool {
        let (Some(&from_node), Some(&to_node)) = (self.node_map.get(from), self.node_map.get(to))
        else {
            return false;
        };
        self.graph
            .edges_connecting(from_node, to_node)
            .any(|e| e.weight().dep_type == dep_type)
    }

    /// Insert an issue node, registering its id with the generator.
    pub(crate) fn insert_issue(&mut self, issue: Issue) {
        self.id_generator
            .register(issue.id.as_str(), issue.content_hash());
        let node = self.graph.add_node(issue.id.clone());
        self.node_map.insert(issue.id.clone(), node);
        self.issues.insert(issue.id.clone(), issue);
    }

    /// Insert an edge between two existing nodes without validation.
    /// Callers have already checked endpoints and duplicates.
    pub(crate) fn insert_edge(
        &mut self,
        from: &IssueId,
        to: &IssueId,
        dep_type: DependencyType,
        created_at: DateTime<Utc>,
    ) {
        let from_node = self.node_map[from];
        let to_node = self.node_map[to];
        self.graph.add_edge(
            from_node,
            to_node,
            EdgeData {
                dep_type,
                created_at,
            },
        );
    }
}

/// Apply a status change, keeping `closed_at`/`close_reason` consistent.
///
/// The caller has already validated the transition.
pub(crate) fn apply_status(issue: &mut Issue, status: IssueStatus, reason: Option<String>) {
    let was_closed = matches!(issue.status, IssueStatus::Closed | IssueStatus::Archived);
    issue.status = status;
    match status {
        IssueStatus::Closed | IssueStatus::Archived => {
            if issue.closed_at.is_none() {
                issue.closed_at = Some(Utc::now());
            }
            if reason.is_some() {
                issue.close_reason = reason;
            }
        }
        _ => {
            if was_closed {
                issue.closed_at = None;
                issue.close_reason = None;
            }
        }
    }
}

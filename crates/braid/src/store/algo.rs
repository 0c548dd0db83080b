//! Graph algorithms over the dependency graph.
//!
//! Readiness, blocking, and cycles are computed over `blocks` edges only;
//! `related` and `discovered-from` are informational and `parent-child`
//! drives the tree builder. Edge direction everywhere is dependent ->
//! dependency.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

use crate::domain::{DependencyType, Issue, IssueFilter, IssueId};
use crate::error::{Error, GraphError, Result};

use super::inner::{EdgeData, StoreInner};

/// Default depth cap for [`build_tree`], bounding output on malformed data.
pub const DEFAULT_TREE_DEPTH: usize = 3;

/// Whether a path `from -> ... -> to` exists over `blocks` edges.
///
/// Used as the insertion-time cycle guard: adding `a -> b` is rejected when
/// `b` already reaches `a`.
pub(crate) fn blocks_path_exists(
    graph: &DiGraph<IssueId, EdgeData>,
    from: NodeIndex,
    to: NodeIndex,
) -> bool {
    if from == to {
        return true;
    }
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([from]);
    visited.insert(from);

    while let Some(node) = queue.pop_front() {
        for edge in graph.edges(node) {
            if edge.weight().dep_type != DependencyType::Blocks {
                continue;
            }
            let next = edge.target();
            if next == to {
                return true;
            }
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

/// Find every distinct cycle over `blocks` edges.
///
/// This is the standalone audit behind the `cycles` command: reconciliation
/// imports edges without the insertion-time guard, so the graph can carry
/// cycles that were never observable through `add_dependency`. Each cycle is
/// returned as an ordered id list rotated to start at its smallest member;
/// an empty result means the graph is acyclic.
pub(crate) fn detect_cycles(inner: &StoreInner) -> Vec<Vec<IssueId>> {
    let graph = &inner.graph;
    let mut found: BTreeSet<Vec<IssueId>> = BTreeSet::new();

    // Iterative DFS with an explicit path stack; a back edge onto the
    // current path closes a cycle.
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }

        let mut path: Vec<NodeIndex> = Vec::new();
        let mut on_path: HashSet<NodeIndex> = HashSet::new();
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = vec![(start, blocks_targets(graph, start))];
        path.push(start);
        on_path.insert(start);
        visited.insert(start);

        loop {
            let next = match stack.last_mut() {
                Some((_, targets)) => targets.pop(),
                None => break,
            };
            match next {
                Some(next) if on_path.contains(&next) => {
                    let pos = path.iter().position(|&n| n == next).unwrap_or(0);
                    let cycle: Vec<IssueId> =
                        path[pos..].iter().map(|&n| graph[n].clone()).collect();
                    found.insert(normalize_cycle(cycle));
                }
                Some(next) if !visited.contains(&next) => {
                    visited.insert(next);
                    on_path.insert(next);
                    path.push(next);
                    stack.push((next, blocks_targets(graph, next)));
                }
                Some(_) => {}
                None => {
                    if let Some((node, _)) = stack.pop() {
                        path.pop();
                        on_path.remove(&node);
                    }
                }
            }
        }
    }

    found.into_iter().collect()
}

fn blocks_targets(graph: &DiGraph<IssueId, EdgeData>, node: NodeIndex) -> Vec<NodeIndex> {
    graph
        .edges(node)
        .filter(|e| e.weight().dep_type == DependencyType::Blocks)
        .map(|e| e.target())
        .collect()
}

/// Rotate a cycle so it starts at its lexicographically smallest id.
fn normalize_cycle(mut cycle: Vec<IssueId>) -> Vec<IssueId> {
    if cycle.is_empty() {
        return cycle;
    }
    let min_pos = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(i, _)| i);
    cycle.rotate_left(min_pos);
    cycle
}

/// Open issues with no unresolved `blocks` obligation, sorted by priority
/// ascending then creation time ascending.
pub(crate) fn ready_issues(inner: &StoreInner, filter: &IssueFilter) -> Vec<Issue> {
    let mut ready: Vec<Issue> = inner
        .issues
        .values()
        .filter(|issue| issue.status.is_open())
        .filter(|issue| open_blockers_of(inner, &issue.id).is_empty())
        .filter(|issue| filter.matches(issue))
        .cloned()
        .collect();

    ready.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    if let Some(limit) = filter.limit {
        ready.truncate(limit);
    }
    ready
}

/// Open issues with at least one unresolved blocker, paired with the ids of
/// the blockers still in the way.
pub(crate) fn blocked_issues(inner: &StoreInner) -> Vec<(Issue, Vec<IssueId>)> {
    let mut blocked: Vec<(Issue, Vec<IssueId>)> = inner
        .issues
        .values()
        .filter(|issue| issue.status.is_open())
        .filter_map(|issue| {
            let blockers = open_blockers_of(inner, &issue.id);
            if blockers.is_empty() {
                None
            } else {
                Some((issue.clone(), blockers))
            }
        })
        .collect();

    blocked.sort_by(|(a, _), (b, _)| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.id.cmp(&b.id))
    });
    blocked
}

/// Ids of the issue's direct blockers that have not resolved yet.
fn open_blockers_of(inner: &StoreInner, id: &IssueId) -> Vec<IssueId> {
    let Some(&node) = inner.node_map.get(id) else {
        return Vec::new();
    };
    let mut blockers: Vec<IssueId> = inner
        .graph
        .edges(node)
        .filter(|e| e.weight().dep_type == DependencyType::Blocks)
        .map(|e| inner.graph[e.target()].clone())
        .filter(|blocker_id| {
            inner
                .issues
                .get(blocker_id)
                .is_some_and(|b| !b.status.resolves_blocking())
        })
        .collect();
    blockers.sort();
    blockers
}

/// Shortest `blocks` chain from `a` to `b`, endpoints included.
///
/// # Errors
///
/// `NotFound` when either endpoint is absent, [`GraphError::NoPath`] when
/// `b` is not reachable from `a` over `blocks` edges.
pub(crate) fn dependency_chain(
    inner: &StoreInner,
    from: &IssueId,
    to: &IssueId,
) -> Result<Vec<IssueId>> {
    let &start = inner
        .node_map
        .get(from)
        .ok_or_else(|| Error::NotFound(from.to_string()))?;
    let &goal = inner
        .node_map
        .get(to)
        .ok_or_else(|| Error::NotFound(to.to_string()))?;

    if start == goal {
        return Ok(vec![from.clone()]);
    }

    // BFS; predecessor map reconstructs the shortest path.
    let mut pred: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut visited = HashSet::from([start]);

    'search: while let Some(node) = queue.pop_front() {
        for edge in inner.graph.edges(node) {
            if edge.weight().dep_type != DependencyType::Blocks {
                continue;
            }
            let next = edge.target();
            if visited.insert(next) {
                pred.insert(next, node);
                if next == goal {
                    break 'search;
                }
                queue.push_back(next);
            }
        }
    }

    if !pred.contains_key(&goal) {
        return Err(GraphError::NoPath {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into());
    }

    let mut path = vec![goal];
    let mut cursor = goal;
    while let Some(&prev) = pred.get(&cursor) {
        path.push(prev);
        cursor = prev;
    }
    path.reverse();
    Ok(path.into_iter().map(|n| inner.graph[n].clone()).collect())
}

/// A node in the hierarchy tree produced by [`build_tree`].
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    /// The issue at this node.
    pub issue: Issue,

    /// Child issues, ordered by when their parent-child edge was created.
    pub children: Vec<TreeNode>,
}

/// Expand the `parent-child` hierarchy below `root`, depth-limited.
///
/// # Errors
///
/// `NotFound` when the root is absent.
pub(crate) fn build_tree(
    inner: &StoreInner,
    root: &IssueId,
    max_depth: usize,
) -> Result<TreeNode> {
    let issue = inner
        .issues
        .get(root)
        .ok_or_else(|| Error::NotFound(root.to_string()))?
        .clone();
    Ok(expand_node(inner, issue, max_depth))
}

fn expand_node(inner: &StoreInner, issue: Issue, remaining_depth: usize) -> TreeNode {
    if remaining_depth == 0 {
        return TreeNode {
            issue,
            children: Vec::new(),
        };
    }

    let Some(&node) = inner.node_map.get(&issue.id) else {
        return TreeNode {
            issue,
            children: Vec::new(),
        };
    };

    // Children point at their parent, so they arrive on incoming edges.
    let mut child_edges: Vec<(chrono::DateTime<chrono::Utc>, IssueId)> = inner
        .graph
        .edges_directed(node, Direction::Incoming)
        .filter(|e| e.weight().dep_type == DependencyType::ParentChild)
        .map(|e| (e.weight().created_at, inner.graph[e.source()].clone()))
        .collect();
    child_edges.sort_by(|(ta, ida), (tb, idb)| ta.cmp(tb).then_with(|| ida.cmp(idb)));

    let children = child_edges
        .into_iter()
        .filter_map(|(_, child_id)| inner.issues.get(&child_id).cloned())
        .map(|child| expand_node(inner, child, remaining_depth - 1))
        .collect();

    TreeNode { issue, children }
}

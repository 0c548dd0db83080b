//! Duplicate detection and merging.
//!
//! Issues are duplicates when their content hashes match and their status
//! classes agree (open with open, closed with closed). Merging closes the
//! sources, migrates every edge touching a source onto the target, and
//! rewrites textual mentions of source ids in other issues' free text.

use std::collections::HashMap;

use chrono::Utc;
use petgraph::Direction;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::debug;

use crate::domain::{DependencyType, IssueId, IssueStatus};
use crate::error::{Error, GraphError, Result};
use crate::store::Store;
use crate::store::algo::blocks_path_exists;
use crate::store::inner::{StoreInner, apply_status};

/// A set of issues sharing identical defining content.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    /// Shared content hash.
    pub content_hash: String,

    /// The issue the others should merge into: most incoming references,
    /// ties broken by smallest id.
    pub target: IssueId,

    /// The remaining members of the group.
    pub sources: Vec<IssueId>,
}

/// What a merge did (or, for a dry run, would do).
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    /// Merge target.
    pub target: IssueId,

    /// Sources that were (or would be) closed into the target.
    pub merged: Vec<IssueId>,

    /// Edges re-pointed at the target.
    pub migrated_edges: usize,

    /// Edges dropped because migration would have duplicated an existing
    /// edge, produced a self-loop, or closed a `blocks` cycle.
    pub dropped_edges: usize,

    /// Issues whose free text was rewritten to mention the target.
    pub rewritten_refs: usize,

    /// True when nothing was mutated.
    pub dry_run: bool,
}

/// Group duplicate issues by content hash within matching status classes.
pub async fn find_duplicate_groups(store: &Store) -> Vec<DuplicateGroup> {
    let inner = store.lock_inner().await;

    let mut buckets: HashMap<(String, bool), Vec<IssueId>> = HashMap::new();
    for issue in inner.issues.values() {
        buckets
            .entry((issue.content_hash(), issue.status.is_open()))
            .or_default()
            .push(issue.id.clone());
    }

    let mut groups: Vec<DuplicateGroup> = buckets
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((content_hash, _), mut ids)| {
            ids.sort();
            let target = pick_target(&inner, &ids);
            let sources = ids.into_iter().filter(|id| *id != target).collect();
            DuplicateGroup {
                content_hash,
                target,
                sources,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.target.cmp(&b.target));
    groups
}

/// Most incoming references wins; ties go to the smallest id (the input is
/// sorted, so the first maximum is the tie-break winner).
fn pick_target(inner: &StoreInner, ids: &[IssueId]) -> IssueId {
    let mut best = ids[0].clone();
    let mut best_count = incoming_count(inner, &best);
    for id in &ids[1..] {
        let count = incoming_count(inner, id);
        if count > best_count {
            best = id.clone();
            best_count = count;
        }
    }
    best
}

fn incoming_count(inner: &StoreInner, id: &IssueId) -> usize {
    inner
        .node_map
        .get(id)
        .map(|&node| {
            inner
                .graph
                .edges_directed(node, Direction::Incoming)
                .count()
        })
        .unwrap_or(0)
}

/// Merge `sources` into `target`.
///
/// Each source is closed with a standard reason, its edges are migrated to
/// the target (deduplicated, self-loops and cycle-closing `blocks` edges
/// dropped), and free-text mentions of source ids anywhere in the store are
/// rewritten to the target id. Re-merging already-merged sources is a
/// no-op, so the operation is idempotent.
///
/// # Errors
///
/// [`GraphError::SelfMerge`] when the target appears among the sources,
/// `NotFound` when any id is absent. With `dry_run` the report is computed
/// without mutating the store.
pub async fn merge_issues(
    store: &Store,
    sources: &[IssueId],
    target: &IssueId,
    dry_run: bool,
) -> Result<MergeReport> {
    let mut inner = store.lock_inner().await;

    if sources.iter().any(|s| s == target) {
        return Err(GraphError::SelfMerge(target.to_string()).into());
    }
    if !inner.issues.contains_key(target) {
        return Err(Error::NotFound(target.to_string()));
    }
    for source in sources {
        if !inner.issues.contains_key(source) {
            return Err(Error::NotFound(source.to_string()));
        }
    }

    let mut report = MergeReport {
        target: target.clone(),
        merged: Vec::new(),
        migrated_edges: 0,
        dropped_edges: 0,
        rewritten_refs: 0,
        dry_run,
    };

    for source in sources {
        // Edges touching the source, as (from, to, type, created_at) with
        // the source swapped for the target.
        let node = inner.node_map[source];
        let mut migrations = Vec::new();
        for edge in inner.graph.edges_directed(node, Direction::Incoming) {
            let from = inner.graph[edge.source()].clone();
            migrations.push((
                from,
                target.clone(),
                edge.weight().dep_type,
                edge.weight().created_at,
            ));
        }
        for edge in inner.graph.edges_directed(node, Direction::Outgoing) {
            let to = inner.graph[edge.target()].clone();
            migrations.push((
                target.clone(),
                to,
                edge.weight().dep_type,
                edge.weight().created_at,
            ));
        }

        if !dry_run {
            // Drop the source's edges before re-adding them on the target;
            // removing the node would also renumber it, so edges only.
            let edge_ids: Vec<_> = inner
                .graph
                .edges_directed(node, Direction::Incoming)
                .chain(inner.graph.edges_directed(node, Direction::Outgoing))
                .map(|e| e.id())
                .collect();
            for edge_id in edge_ids {
                inner.graph.remove_edge(edge_id);
            }
        }

        for (from, to, dep_type, created_at) in migrations {
            if from == to {
                report.dropped_edges += 1;
                continue;
            }
            if inner.edge_exists(&from, &to, dep_type) {
                report.dropped_edges += 1;
                continue;
            }
            if dep_type == DependencyType::Blocks {
                let from_node = inner.node_map[&from];
                let to_node = inner.node_map[&to];
                if blocks_path_exists(&inner.graph, to_node, from_node) {
                    report.dropped_edges += 1;
                    continue;
                }
            }
            if !dry_run {
                inner.insert_edge(&from, &to, dep_type, created_at);
            }
            report.migrated_edges += 1;
        }

        // Children of a merged epic follow their parent-child edge.
        if !dry_run {
            let orphaned: Vec<IssueId> = inner
                .issues
                .values()
                .filter(|i| i.epic_id.as_ref() == Some(source))
                .map(|i| i.id.clone())
                .collect();
            for id in orphaned {
                if let Some(issue) = inner.issues.get_mut(&id) {
                    issue.epic_id = Some(target.clone());
                }
            }
        }

        let already_closed = inner
            .issues
            .get(source)
            .is_some_and(|i| !i.status.is_open());
        if !already_closed {
            report.merged.push(source.clone());
            if !dry_run {
                if let Some(issue) = inner.issues.get_mut(source) {
                    apply_status(
                        issue,
                        IssueStatus::Closed,
                        Some(format!("Duplicate of {target}")),
                    );
                    issue.updated_at = Utc::now();
                }
            }
        }

        // Rewrite textual mentions of the source id in other issues.
        let source_text = source.to_string();
        let target_text = target.to_string();
        let mentioning: Vec<IssueId> = inner
            .issues
            .values()
            .filter(|i| i.id != *source)
            .filter(|i| i.title.contains(&source_text) || i.description.contains(&source_text))
            .map(|i| i.id.clone())
            .collect();
        report.rewritten_refs += mentioning.len();
        if !dry_run {
            for id in mentioning {
                if let Some(issue) = inner.issues.get_mut(&id) {
                    issue.title = issue.title.replace(&source_text, &target_text);
                    issue.description = issue.description.replace(&source_text, &target_text);
                    issue.updated_at = Utc::now();
                }
            }
        }

        debug!(source = %source, target = %target, dry_run, "merged duplicate");
    }

    Ok(report)
}

//! Reconciliation: export/import against the interchange file and the
//! git-backed synchronization cycle.
//!
//! A cycle walks `Idle -> Exporting -> Committing -> Pulling -> Importing
//! -> Pushing -> Idle`. A step failure marks the cycle `Failed` without
//! rolling back completed steps; the next timer tick retries from the top,
//! so the pipeline is eventually consistent rather than atomic.

mod git;
pub mod merge;
mod record;

pub use merge::{DuplicateGroup, MergeReport, find_duplicate_groups, merge_issues};
pub use record::{DependencyRecord, IssueRecord, Record};

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{
    Dependency, DependencyType, Issue, IssueId, IssueStatus, IssueType, validate_title,
};
use crate::error::{ReconcileError, Result, SyncStep};
use crate::store::Store;
use crate::store::inner::StoreInner;

/// Non-fatal problems encountered while applying an import.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportWarning {
    /// A line in the interchange file could not be parsed.
    MalformedLine {
        /// 1-based line number.
        line_number: usize,
        /// Parse failure description.
        error: String,
    },

    /// A dependency record referenced an id absent from both the store and
    /// the import batch.
    UnknownDependencyTarget {
        /// Dependent id.
        from: IssueId,
        /// Missing target id.
        to: IssueId,
    },

    /// An issue record requested a status change the transition matrix
    /// forbids; the field was left unchanged rather than applied silently.
    InvalidTransition {
        /// Issue id.
        id: IssueId,
        /// Status currently in the store.
        from: IssueStatus,
        /// Status the record asked for.
        to: IssueStatus,
    },

    /// An issue record failed validation and was skipped.
    InvalidRecord {
        /// Offending id.
        id: IssueId,
        /// What was wrong.
        error: String,
    },
}

impl std::fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedLine { line_number, error } => {
                write!(f, "line {line_number}: malformed record: {error}")
            }
            Self::UnknownDependencyTarget { from, to } => {
                write!(f, "dependency {from} -> {to}: target not found, edge dropped")
            }
            Self::InvalidTransition { id, from, to } => {
                write!(f, "{id}: invalid status transition {from} -> {to}, kept {from}")
            }
            Self::InvalidRecord { id, error } => write!(f, "{id}: invalid record: {error}"),
        }
    }
}

/// What an import did.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ImportReport {
    /// New issues inserted.
    pub created: usize,

    /// Existing issues that received field-level updates.
    pub updated: usize,

    /// Records that matched the store exactly.
    pub unchanged: usize,

    /// Placeholder parents synthesized for orphaned hierarchical children.
    pub tombstones: Vec<IssueId>,

    /// Dependency edges added.
    pub edges_added: usize,

    /// Non-fatal problems.
    pub warnings: Vec<ImportWarning>,
}

impl ImportReport {
    /// Whether the import mutated the store at all.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.created > 0 || self.updated > 0 || !self.tombstones.is_empty() || self.edges_added > 0
    }
}

/// Records read from an interchange file plus the warnings reading them
/// produced.
#[derive(Debug, Default)]
pub struct RecordBatch {
    /// Parsed records in file order.
    pub records: Vec<Record>,
    /// Lines that failed to parse.
    pub warnings: Vec<ImportWarning>,
}

/// Read the interchange file into a [`RecordBatch`].
///
/// # Errors
///
/// Returns an error only when the file cannot be read; bad lines become
/// warnings.
pub async fn read_records(path: &Path) -> Result<RecordBatch> {
    let (records, jsonl_warnings) = braid_jsonl::read_jsonl_resilient::<Record, _>(path).await?;
    let warnings = jsonl_warnings
        .into_iter()
        .map(|w| match w {
            braid_jsonl::Warning::MalformedJson { line_number, error } => {
                ImportWarning::MalformedLine { line_number, error }
            }
            braid_jsonl::Warning::SkippedLine {
                line_number,
                reason,
            } => ImportWarning::MalformedLine {
                line_number,
                error: reason,
            },
        })
        .collect();
    Ok(RecordBatch { records, warnings })
}

/// Serialize a snapshot to interchange lines: issues by id, then edges by
/// `(from, to, type)`. The ordering is what makes export -> import ->
/// export byte-identical for unchanged records.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_records(issues: &[Issue], dependencies: &[Dependency]) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(issues.len() + dependencies.len());
    for issue in issues {
        lines.push(serde_json::to_string(&IssueRecord::from_issue(issue))?);
    }
    for dep in dependencies {
        lines.push(serde_json::to_string(&DependencyRecord::from_dependency(
            dep,
        ))?);
    }
    Ok(lines)
}

/// Atomically write a snapshot to the interchange file.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn write_records(
    path: &Path,
    issues: &[Issue],
    dependencies: &[Dependency],
) -> Result<()> {
    let lines = render_records(issues, dependencies)?;
    braid_jsonl::write_raw_lines_atomic(path, &lines).await?;
    Ok(())
}

/// Apply a record batch to the store.
///
/// Classification per issue record: exact match (no-op), field-level update
/// (status changes go through the same transition validation as direct
/// updates), or new issue. Hierarchical children whose parents are missing
/// get tombstone parents; dependency records are resolved against the whole
/// batch before being dropped as orphans. Edges are inserted without the
/// insertion-time cycle guard — `detect_cycles` exists as the audit for
/// exactly this path.
pub fn import_records(inner: &mut StoreInner, batch: RecordBatch) -> ImportReport {
    let mut report = ImportReport {
        warnings: batch.warnings,
        ..ImportReport::default()
    };
    let now = Utc::now();

    let mut issue_records = Vec::new();
    let mut dep_records = Vec::new();
    for record in batch.records {
        match record {
            Record::Issue(r) => issue_records.push(r),
            Record::Dependency(r) => dep_records.push(r),
        }
    }

    // Parents sort before their children, so ancestor synthesis below only
    // ever looks backwards.
    issue_records.sort_by(|a, b| a.id.cmp(&b.id));

    let mut epic_links: Vec<(IssueId, IssueId)> = Vec::new();

    for record in issue_records {
        if let Err(e) = validate_title(&record.title) {
            report.warnings.push(ImportWarning::InvalidRecord {
                id: record.id.clone(),
                error: e.to_string(),
            });
            continue;
        }
        if record.priority > crate::domain::MAX_PRIORITY {
            report.warnings.push(ImportWarning::InvalidRecord {
                id: record.id.clone(),
                error: format!("invalid priority {}", record.priority),
            });
            continue;
        }

        ensure_ancestors(inner, &record.id, &mut report, now);

        // The parent-child edge is canonical; an epic_id on the record (or
        // a hierarchical id) implies one. Links are applied after every
        // issue record has landed so forward references resolve.
        if let Some(parent) = &record.epic_id {
            epic_links.push((record.id.clone(), parent.clone()));
        }

        if let Some(existing) = inner.issues.get(&record.id) {
            let existing = existing.clone();
            apply_issue_record(inner, &existing, record, &mut report, now);
        } else {
            let issue = record.into_issue(now);
            debug!(id = %issue.id, "import: new issue");
            inner.insert_issue(issue);
            report.created += 1;
        }
    }

    // Explicit edge records first: they carry creation timestamps the
    // inferred links below do not, and the first writer of an edge wins.
    for dep in dep_records {
        if dep.from_id == dep.to_id {
            report.warnings.push(ImportWarning::InvalidRecord {
                id: dep.from_id.clone(),
                error: "self-dependency dropped".to_string(),
            });
            continue;
        }
        let missing_end = [&dep.from_id, &dep.to_id]
            .into_iter()
            .find(|id| !inner.issues.contains_key(*id));
        if missing_end.is_some() {
            report.warnings.push(ImportWarning::UnknownDependencyTarget {
                from: dep.from_id.clone(),
                to: dep.to_id.clone(),
            });
            continue;
        }
        let created_at = dep.created_at.unwrap_or(now);
        if dep.dep_type == DependencyType::ParentChild {
            // Same path as epic_id mirrors: dedupe, epic check, both sides.
            link_child(inner, &dep.from_id, &dep.to_id, &mut report, created_at);
            continue;
        }
        if inner.edge_exists(&dep.from_id, &dep.to_id, dep.dep_type) {
            continue;
        }
        inner.insert_edge(&dep.from_id, &dep.to_id, dep.dep_type, created_at);
        report.edges_added += 1;
    }

    // Hierarchical ids imply hierarchy even when no record spelled the
    // edge out.
    for id in inner.issues.keys() {
        if let Some(parent) = id.parent() {
            epic_links.push((id.clone(), parent));
        }
    }

    for (child, parent) in epic_links {
        if inner.issues.contains_key(&parent) {
            link_child(inner, &child, &parent, &mut report, now);
        } else {
            report.warnings.push(ImportWarning::UnknownDependencyTarget {
                from: child,
                to: parent,
            });
        }
    }

    report
}

/// Merge an issue record into an existing issue.
fn apply_issue_record(
    inner: &mut StoreInner,
    existing: &Issue,
    record: IssueRecord,
    report: &mut ImportReport,
    now: chrono::DateTime<chrono::Utc>,
) {
    let mut candidate = record.into_issue(now);
    // created_at is immutable once minted; partial records inherit it.
    candidate.created_at = existing.created_at;

    if candidate == *existing {
        report.unchanged += 1;
        return;
    }

    if candidate.status != existing.status
        && !existing.status.can_transition_to(candidate.status)
    {
        report.warnings.push(ImportWarning::InvalidTransition {
            id: existing.id.clone(),
            from: existing.status,
            to: candidate.status,
        });
        candidate.status = existing.status;
        candidate.closed_at = existing.closed_at;
        candidate.close_reason = existing.close_reason.clone();
        if candidate == *existing {
            report.unchanged += 1;
            return;
        }
    }

    if candidate.updated_at <= existing.updated_at {
        candidate.updated_at = now;
    }

    debug!(id = %candidate.id, "import: updating issue");
    inner
        .id_generator
        .register(candidate.id.as_str(), candidate.content_hash());
    inner.issues.insert(candidate.id.clone(), candidate);
    report.updated += 1;
}

/// Synthesize tombstone ancestors for a hierarchical id whose parents are
/// missing from both the store and the batch processed so far.
fn ensure_ancestors(
    inner: &mut StoreInner,
    id: &IssueId,
    report: &mut ImportReport,
    now: chrono::DateTime<chrono::Utc>,
) {
    let mut chain = Vec::new();
    let mut cursor = id.parent();
    while let Some(parent) = cursor {
        if inner.issues.contains_key(&parent) {
            break;
        }
        cursor = parent.parent();
        chain.push(parent);
    }

    // Create from the root down so each tombstone can link to its parent.
    for parent in chain.into_iter().rev() {
        warn!(id = %parent, "import: synthesizing tombstone parent");
        let tombstone = Issue {
            id: parent.clone(),
            title: format!("[reconstructed] {parent}"),
            description: String::new(),
            status: IssueStatus::Closed,
            priority: 4,
            issue_type: IssueType::Epic,
            epic_id: None,
            assignee: None,
            labels: Vec::new(),
            close_reason: Some("Reconstructed during import".to_string()),
            created_at: now,
            updated_at: now,
            closed_at: Some(now),
            extra: serde_json::Map::new(),
        };
        inner.insert_issue(tombstone);
        if let Some(grandparent) = parent.parent() {
            link_child(inner, &parent, &grandparent, report, now);
        }
        report.tombstones.push(parent);
    }
}

/// Ensure the canonical parent-child edge (and the epic_id mirror) between
/// a child and its parent.
fn link_child(
    inner: &mut StoreInner,
    child: &IssueId,
    parent: &IssueId,
    report: &mut ImportReport,
    created_at: chrono::DateTime<chrono::Utc>,
) {
    if !inner.issues.contains_key(child) {
        return;
    }
    match inner.issues.get(parent) {
        None => return,
        // Only epics own children; a record pointing elsewhere is dropped
        // loudly rather than violating the hierarchy invariant.
        Some(p) if p.issue_type != IssueType::Epic => {
            report.warnings.push(ImportWarning::InvalidRecord {
                id: child.clone(),
                error: format!("epic reference {parent} is not an epic"),
            });
            return;
        }
        Some(_) => {}
    }
    if !inner.edge_exists(child, parent, DependencyType::ParentChild) {
        inner.insert_edge(child, parent, DependencyType::ParentChild, created_at);
        report.edges_added += 1;
    }
    if let Some(issue) = inner.issues.get_mut(child) {
        if issue.epic_id.as_ref() != Some(parent) {
            issue.epic_id = Some(parent.clone());
        }
    }
}

/// Phase of the reconciliation cycle, for daemon health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Nothing in flight.
    Idle,
    /// Writing the store to the interchange file.
    Exporting,
    /// Committing to git.
    Committing,
    /// Rebasing on remote history.
    Pulling,
    /// Applying the (possibly merged) file back to the store.
    Importing,
    /// Pushing local history.
    Pushing,
    /// The last cycle failed; retried on the next tick.
    Failed,
}

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CycleReport {
    /// Issues exported.
    pub exported: usize,

    /// SHA-256 of the exported interchange content.
    pub export_hash: String,

    /// Whether a git commit was created.
    pub committed: bool,

    /// Whether local history was pushed.
    pub pushed: bool,

    /// What the import pass applied.
    pub import: ImportReport,
}

/// Drives reconciliation cycles for one workspace.
///
/// The whole `Exporting..Pushing` sequence runs under one internal mutex:
/// no two cycles overlap, and IPC-triggered cycles queue behind
/// timer-triggered ones.
pub struct Reconciler {
    store: Store,
    workspace_root: PathBuf,
    data_path: PathBuf,
    cycle_lock: Mutex<()>,
    phase: StdMutex<CyclePhase>,
}

impl Reconciler {
    /// Create a reconciler for a store persisted at `data_path` inside the
    /// git workspace rooted at `workspace_root`.
    #[must_use]
    pub fn new(store: Store, workspace_root: PathBuf, data_path: PathBuf) -> Self {
        Self {
            store,
            workspace_root,
            data_path,
            cycle_lock: Mutex::new(()),
            phase: StdMutex::new(CyclePhase::Idle),
        }
    }

    /// The store this reconciler drives.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Current cycle phase.
    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        self.phase.lock().map(|p| *p).unwrap_or(CyclePhase::Failed)
    }

    /// Wait until no cycle is in flight. Used for cooperative shutdown.
    pub async fn wait_idle(&self) {
        drop(self.cycle_lock.lock().await);
    }

    fn set_phase(&self, phase: CyclePhase) {
        if let Ok(mut p) = self.phase.lock() {
            *p = phase;
        }
    }

    /// Run one full reconciliation cycle.
    ///
    /// Outside a git repository the commit/pull/push steps are skipped and
    /// the cycle degrades to export + re-import, which still restores
    /// interchange-file consistency.
    ///
    /// # Errors
    ///
    /// A [`ReconcileError`] tagged with the failing step. Completed steps
    /// are not rolled back.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = self.cycle_lock.lock().await;
        let result = self.run_cycle_inner().await;
        match &result {
            Ok(report) => {
                info!(
                    exported = report.exported,
                    committed = report.committed,
                    pushed = report.pushed,
                    "reconciliation cycle complete"
                );
                self.set_phase(CyclePhase::Idle);
            }
            Err(e) => {
                warn!("reconciliation cycle failed: {e}");
                self.set_phase(CyclePhase::Failed);
            }
        }
        result
    }

    async fn run_cycle_inner(&self) -> Result<CycleReport> {
        // Export. The file is the durable source of truth and direct-mode
        // CLI invocations write it behind our back, so refresh from disk
        // before serializing anything.
        self.set_phase(CyclePhase::Exporting);
        self.store
            .reload()
            .await
            .map_err(|e| ReconcileError::at(SyncStep::Export, e.to_string()))?;
        let (issues, dependencies) = self.store.snapshot().await;
        let lines = render_records(&issues, &dependencies)
            .map_err(|e| ReconcileError::at(SyncStep::Export, e.to_string()))?;
        braid_jsonl::write_raw_lines_atomic(&self.data_path, &lines)
            .await
            .map_err(|e| ReconcileError::at(SyncStep::Export, e.to_string()))?;
        let export_hash = hash_lines(&lines);
        let exported = issues.len();

        let in_repo = git::is_git_repo(&self.workspace_root).await;
        let has_remote = in_repo && git::has_remote(&self.workspace_root).await;

        // Commit
        let mut committed = false;
        if in_repo {
            self.set_phase(CyclePhase::Committing);
            committed = git::stage_and_commit(
                &self.workspace_root,
                &self.data_path,
                "braid: sync issue database",
            )
            .await
            .map_err(|e| ReconcileError::at(SyncStep::Commit, e))?;
        }

        // Pull
        if has_remote {
            self.set_phase(CyclePhase::Pulling);
            git::pull_rebase(&self.workspace_root)
                .await
                .map_err(|e| ReconcileError::at(SyncStep::Pull, e))?;
        }

        // Import
        self.set_phase(CyclePhase::Importing);
        let batch = read_records(&self.data_path)
            .await
            .map_err(|e| ReconcileError::at(SyncStep::Import, e.to_string()))?;
        let import = {
            let mut inner = self.store.lock_inner().await;
            import_records(&mut inner, batch)
        };
        if import.changed() {
            // The merged state goes back to the file; the next cycle's
            // commit step picks it up.
            self.store
                .save()
                .await
                .map_err(|e| ReconcileError::at(SyncStep::Import, e.to_string()))?;
        }

        // Push
        let mut pushed = false;
        if has_remote {
            self.set_phase(CyclePhase::Pushing);
            git::push(&self.workspace_root)
                .await
                .map_err(|e| ReconcileError::at(SyncStep::Push, e))?;
            pushed = true;
        }

        Ok(CycleReport {
            exported,
            export_hash,
            committed,
            pushed,
            import,
        })
    }
}

/// SHA-256 over the rendered interchange lines.
fn hash_lines(lines: &[String]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

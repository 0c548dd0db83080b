//! The graph store: issues plus typed dependency edges for one workspace.
//!
//! State lives in [`inner::StoreInner`] behind `Arc<Mutex<..>>`; the
//! [`Store`] facade exposes async operations that take the lock per call.
//! Persistence is the JSONL interchange file, written atomically through
//! `braid-jsonl` and read back through the reconciliation importer so a
//! fresh load and a reconciliation import share one code path.

pub(crate) mod algo;
pub(crate) mod inner;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

pub use algo::{DEFAULT_TREE_DEPTH, TreeNode};

use crate::domain::{
    Dependency, DependencyType, Issue, IssueFilter, IssueId, IssueStatus, IssueUpdate, NewIssue,
};
use crate::error::Result;
use crate::reconcile::{ImportReport, import_records, read_records, write_records};
use inner::StoreInner;

/// Thread-safe graph store for one workspace.
#[derive(Clone, Debug)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
    path: Option<PathBuf>,
    prefix: String,
}

impl Store {
    /// An ephemeral store with no backing file.
    #[must_use]
    pub fn in_memory(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            inner: Arc::new(Mutex::new(StoreInner::new(prefix.clone()))),
            path: None,
            prefix,
        }
    }

    /// Open a store backed by the interchange file at `path`.
    ///
    /// A missing file is an empty database. Loading goes through the
    /// reconciliation importer, so the returned report carries any
    /// tombstones synthesized for orphaned children and warnings for
    /// records that could not be applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn open(
        path: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Result<(Self, ImportReport)> {
        let path = path.into();
        let prefix = prefix.into();
        let store = Self {
            inner: Arc::new(Mutex::new(StoreInner::new(prefix.clone()))),
            path: Some(path.clone()),
            prefix,
        };

        let report = if path.exists() {
            let records = read_records(&path).await?;
            let mut inner = store.inner.lock().await;
            import_records(&mut inner, records)
        } else {
            ImportReport::default()
        };

        Ok((store, report))
    }

    /// Replace in-memory state with whatever the backing file holds,
    /// discarding unsaved changes. The daemon calls this at the top of
    /// every reconciliation cycle so direct-mode CLI writes are never
    /// clobbered by a stale in-memory snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot be read.
    pub async fn reload(&self) -> Result<ImportReport> {
        let Some(path) = &self.path else {
            return Ok(ImportReport::default());
        };

        let mut fresh = StoreInner::new(self.prefix.clone());
        let report = if path.exists() {
            let records = read_records(path).await?;
            import_records(&mut fresh, records)
        } else {
            ImportReport::default()
        };

        *self.inner.lock().await = fresh;
        Ok(report)
    }

    /// The backing interchange file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist the store to its backing file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails. A store with
    /// no backing file saves as a no-op.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let (issues, dependencies) = self.snapshot().await;
        write_records(path, &issues, &dependencies).await
    }

    /// Create a new issue and return it.
    ///
    /// # Errors
    ///
    /// Validation, unknown dependency targets, hierarchy-depth and id
    /// collision errors, all raised before any mutation.
    pub async fn create(&self, new_issue: NewIssue) -> Result<Issue> {
        self.inner.lock().await.create(new_issue)
    }

    /// Fetch an issue by id.
    pub async fn get(&self, id: &IssueId) -> Option<Issue> {
        self.inner.lock().await.issues.get(id).cloned()
    }

    /// Apply a field-level update.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids; validation errors (including status
    /// transitions) leave the issue untouched.
    pub async fn update(&self, id: &IssueId, updates: IssueUpdate) -> Result<Issue> {
        self.inner.lock().await.update(id, updates)
    }

    /// Close an issue with a reason.
    ///
    /// # Errors
    ///
    /// `NotFound` or an invalid transition.
    pub async fn close(&self, id: &IssueId, reason: Option<String>) -> Result<Issue> {
        self.update(
            id,
            IssueUpdate {
                status: Some(IssueStatus::Closed),
                close_reason: reason,
                ..IssueUpdate::default()
            },
        )
        .await
    }

    /// Reopen a closed or resolved issue.
    ///
    /// # Errors
    ///
    /// `NotFound` or an invalid transition.
    pub async fn reopen(&self, id: &IssueId) -> Result<Issue> {
        self.update(
            id,
            IssueUpdate {
                status: Some(IssueStatus::Open),
                ..IssueUpdate::default()
            },
        )
        .await
    }

    /// Close several issues, reporting a result per id.
    ///
    /// Failures (unknown id, invalid transition) do not stop the batch;
    /// partial success is explicit in the returned pairs.
    pub async fn close_many(
        &self,
        ids: &[IssueId],
        reason: Option<String>,
    ) -> Vec<(IssueId, Result<Issue>)> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.close(id, reason.clone()).await;
            results.push((id.clone(), result));
        }
        results
    }

    /// Remove an issue, cascading its edges.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn remove(&self, id: &IssueId) -> Result<Issue> {
        self.inner.lock().await.remove(id)
    }

    /// Add a typed dependency edge.
    ///
    /// # Errors
    ///
    /// `SelfDependency`, `DuplicateDependency`, `CycleDetected` (for
    /// `blocks` edges), `NotFound`, or `NotAnEpic` for `parent-child`
    /// edges to a non-epic.
    pub async fn add_dependency(
        &self,
        from: &IssueId,
        to: &IssueId,
        dep_type: DependencyType,
    ) -> Result<()> {
        self.inner.lock().await.add_dependency(from, to, dep_type)
    }

    /// Remove a dependency edge; a no-op when absent.
    pub async fn remove_dependency(&self, from: &IssueId, to: &IssueId, dep_type: DependencyType) {
        self.inner.lock().await.remove_dependency(from, to, dep_type);
    }

    /// Add a label (idempotent).
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn add_label(&self, id: &IssueId, label: &str) -> Result<Issue> {
        self.inner.lock().await.add_label(id, label)
    }

    /// Remove a label (idempotent).
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn remove_label(&self, id: &IssueId, label: &str) -> Result<Issue> {
        self.inner.lock().await.remove_label(id, label)
    }

    /// List issues matching a filter, most recent first.
    pub async fn list(&self, filter: &IssueFilter) -> Vec<Issue> {
        let inner = self.inner.lock().await;
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|issue| filter.matches(issue))
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            issues.truncate(limit);
        }
        issues
    }

    /// Open issues with no unresolved blocker, priority then age order.
    pub async fn ready_issues(&self, filter: &IssueFilter) -> Vec<Issue> {
        algo::ready_issues(&*self.inner.lock().await, filter)
    }

    /// Open issues with unresolved blockers, each with its blocker ids.
    pub async fn blocked_issues(&self) -> Vec<(Issue, Vec<IssueId>)> {
        algo::blocked_issues(&*self.inner.lock().await)
    }

    /// Audit the graph for cycles over `blocks` edges.
    pub async fn detect_cycles(&self) -> Vec<Vec<IssueId>> {
        algo::detect_cycles(&*self.inner.lock().await)
    }

    /// Shortest `blocks` chain between two issues.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown endpoints, `NoPath` when unreachable.
    pub async fn dependency_chain(&self, from: &IssueId, to: &IssueId) -> Result<Vec<IssueId>> {
        algo::dependency_chain(&*self.inner.lock().await, from, to)
    }

    /// Hierarchy tree below `root`, capped at `max_depth` levels
    /// (default [`DEFAULT_TREE_DEPTH`]).
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown root.
    pub async fn build_tree(&self, root: &IssueId, max_depth: Option<usize>) -> Result<TreeNode> {
        algo::build_tree(
            &*self.inner.lock().await,
            root,
            max_depth.unwrap_or(DEFAULT_TREE_DEPTH),
        )
    }

    /// Outgoing edges of an issue.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn dependencies_of(&self, id: &IssueId) -> Result<Vec<Dependency>> {
        self.inner.lock().await.dependencies_of(id)
    }

    /// Incoming edges of an issue.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn dependents_of(&self, id: &IssueId) -> Result<Vec<Dependency>> {
        self.inner.lock().await.dependents_of(id)
    }

    /// Number of issues in the store.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.issues.len()
    }

    /// Whether the store holds no issues.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply a record batch to the store (the `import` command and the
    /// reconciliation cycle both land here).
    pub async fn import_batch(&self, batch: crate::reconcile::RecordBatch) -> ImportReport {
        let mut inner = self.inner.lock().await;
        import_records(&mut inner, batch)
    }

    /// Deterministic snapshot for export: issues sorted by id, edges by
    /// `(from, to, type)`.
    pub async fn snapshot(&self) -> (Vec<Issue>, Vec<Dependency>) {
        let inner = self.inner.lock().await;
        let mut issues: Vec<Issue> = inner.issues.values().cloned().collect();
        issues.sort_by(|a, b| a.id.cmp(&b.id));

        let mut dependencies = inner.all_dependencies();
        dependencies.sort_by(|a, b| {
            a.from_id
                .cmp(&b.from_id)
                .then_with(|| a.to_id.cmp(&b.to_id))
                .then_with(|| a.dep_type.cmp(&b.dep_type))
        });
        (issues, dependencies)
    }

    /// Lock the inner state; used by the reconciliation engine and the
    /// duplicate merger, which need multi-step exclusive access.
    pub(crate) async fn lock_inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().await
    }
}

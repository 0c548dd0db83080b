//! Command execution logic.

use anyhow::Result;
use serde_json::json;

use super::args::{
    ChainArgs, CloseArgs, CreateArgs, DaemonAction, DaemonArgs, DeleteArgs, DepAction, DepArgs,
    ExportArgs, ImportArgs, InitArgs, LabelAction, LabelArgs, ListArgs, MergeArgs, ReadyArgs,
    ReopenArgs, ShowArgs, SyncArgs, TreeArgs, UpdateArgs,
};
use super::Commands;
use crate::app::{App, spawn_daemon};
use crate::config;
use crate::domain::{DependencyType, IssueFilter, IssueId, IssueUpdate, NewIssue};
use crate::error::{Error, IpcError};
use crate::ipc::DaemonClient;
use crate::output::{self, OutputConfig, OutputMode, print_json};
use crate::reconcile::{self, Reconciler};

/// Dispatch a parsed command.
pub(super) async fn run(command: Commands, mode: OutputMode, no_daemon: bool) -> Result<()> {
    let config = OutputConfig::from_env();

    match command {
        Commands::Init(args) => execute_init(&args).await,
        Commands::Daemon(args) => execute_daemon(&args, mode).await,
        other => {
            let cwd = std::env::current_dir()?;
            let mut app = App::from_directory(&cwd).await?;
            if no_daemon {
                app.set_no_daemon();
            }
            execute_with_app(&app, other, mode, &config).await
        }
    }
}

async fn execute_with_app(
    app: &App,
    command: Commands,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    match command {
        Commands::Init(_) | Commands::Daemon(_) => unreachable!("handled before App is opened"),
        Commands::Info => execute_info(app, mode).await,
        Commands::Create(args) => execute_create(app, &args, mode, config).await,
        Commands::Show(args) => execute_show(app, &args, mode, config).await,
        Commands::List(args) => execute_list(app, &args, mode, config).await,
        Commands::Update(args) => execute_update(app, &args, mode, config).await,
        Commands::Close(args) => execute_close(app, &args, mode, config).await,
        Commands::Reopen(args) => execute_reopen(app, &args, mode, config).await,
        Commands::Delete(args) => execute_delete(app, &args, mode, config).await,
        Commands::Label(args) => execute_label(app, &args, mode, config).await,
        Commands::Dep(args) => execute_dep(app, &args, mode, config).await,
        Commands::Ready(args) => execute_ready(app, &args, mode, config).await,
        Commands::Blocked => execute_blocked(app, mode, config).await,
        Commands::Tree(args) => execute_tree(app, &args, mode, config).await,
        Commands::Chain(args) => execute_chain(app, &args, mode, config).await,
        Commands::Cycles => execute_cycles(app, mode, config).await,
        Commands::Export(args) => execute_export(app, &args).await,
        Commands::Import(args) => execute_import(app, &args, mode).await,
        Commands::Duplicates => execute_duplicates(app, mode, config).await,
        Commands::Merge(args) => execute_merge(app, &args, mode).await,
        Commands::Sync(args) => execute_sync(app, &args, mode).await,
    }
}

async fn execute_init(args: &InitArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let result = config::init(&cwd, args.prefix.as_deref()).await?;
    if !args.quiet {
        println!("Initialized braid workspace in {}", result.braid_dir.display());
        println!("  Config: {}", result.config_file.display());
        println!("  Issues: {}", result.issues_file.display());
        println!("  Issue prefix: {}", result.prefix);
    }
    Ok(())
}

async fn execute_info(app: &App, mode: OutputMode) -> Result<()> {
    let all = app.store().list(&IssueFilter::default()).await;
    let mut by_status = std::collections::BTreeMap::new();
    for issue in &all {
        *by_status.entry(issue.status.to_string()).or_insert(0usize) += 1;
    }

    match mode {
        OutputMode::Json => print_json(&json!({
            "database_path": app.issues_path().display().to_string(),
            "issue_prefix": app.config().issue_prefix,
            "sync_interval_secs": app.config().sync.interval_secs,
            "issues": { "total": all.len(), "by_status": by_status },
        }))?,
        OutputMode::Text => {
            println!("Database:     {}", app.issues_path().display());
            println!("Issue prefix: {}", app.config().issue_prefix);
            println!("Issues:       {} total", all.len());
            for (status, count) in by_status {
                println!("  {status:<12} {count}");
            }
        }
    }
    Ok(())
}

/// Parse `--deps` entries: "issue-id" (defaults to blocks) or
/// "type:issue-id".
fn parse_deps(specs: &[String]) -> Result<Vec<(IssueId, DependencyType)>> {
    let mut deps = Vec::with_capacity(specs.len());
    for spec in specs {
        if let Some((type_str, id)) = spec.split_once(':') {
            let dep_type = match type_str {
                "blocks" => DependencyType::Blocks,
                "related" => DependencyType::Related,
                "parent-child" => DependencyType::ParentChild,
                "discovered-from" => DependencyType::DiscoveredFrom,
                other => anyhow::bail!(
                    "invalid dependency type '{other}'; expected blocks, related, parent-child, or discovered-from"
                ),
            };
            deps.push((IssueId::new(id), dep_type));
        } else {
            deps.push((IssueId::new(spec.as_str()), DependencyType::Blocks));
        }
    }
    Ok(deps)
}

async fn execute_create(
    app: &App,
    args: &CreateArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let new_issue = NewIssue {
        title: args.title.clone(),
        description: args.description.clone().unwrap_or_default(),
        priority: args.priority,
        issue_type: args.issue_type.into(),
        epic: args.epic.as_deref().map(IssueId::new),
        assignee: args.assignee.clone(),
        labels: args.labels.clone(),
        dependencies: parse_deps(&args.deps)?,
    };

    let issue = app.store().create(new_issue).await?;
    let note = app.save_and_notify().await?;

    match mode {
        OutputMode::Json => print_json(&issue)?,
        OutputMode::Text => {
            println!("Created {}", output::issue_line(&issue, config));
            if let Some(note) = note {
                println!("note: {note}");
            }
        }
    }
    Ok(())
}

async fn execute_show(
    app: &App,
    args: &ShowArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let id = IssueId::new(args.issue_id.as_str());
    let issue = app
        .store()
        .get(&id)
        .await
        .ok_or_else(|| Error::NotFound(id.to_string()))?;

    match mode {
        OutputMode::Json => {
            let deps = app.store().dependencies_of(&id).await?;
            let dependents = app.store().dependents_of(&id).await?;
            print_json(&json!({
                "issue": issue,
                "dependencies": deps,
                "dependents": dependents,
            }))?;
        }
        OutputMode::Text => {
            print!("{}", output::issue_details(&issue, config));
            let deps = app.store().dependencies_of(&id).await?;
            if !deps.is_empty() {
                println!("  depends on:");
                for dep in deps {
                    println!("    {} ({})", dep.to_id, dep.dep_type);
                }
            }
            let dependents = app.store().dependents_of(&id).await?;
            if !dependents.is_empty() {
                println!("  depended on by:");
                for dep in dependents {
                    println!("    {} ({})", dep.from_id, dep.dep_type);
                }
            }
        }
    }
    Ok(())
}

async fn execute_list(
    app: &App,
    args: &ListArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let filter = IssueFilter {
        status: args.status.map(Into::into),
        priority: args.priority,
        issue_type: args.issue_type.map(Into::into),
        assignee: args.assignee.clone(),
        label: args.label.clone(),
        limit: Some(args.limit),
    };
    let issues = app.store().list(&filter).await;

    match mode {
        OutputMode::Json => print_json(&issues)?,
        OutputMode::Text => {
            if issues.is_empty() {
                println!("No issues match.");
            }
            for issue in issues {
                println!("{}", output::issue_line(&issue, config));
            }
        }
    }
    Ok(())
}

async fn execute_update(
    app: &App,
    args: &UpdateArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let id = IssueId::new(args.issue_id.as_str());
    let assignee = if args.no_assignee {
        Some(None)
    } else {
        args.assignee.clone().map(Some)
    };
    let updates = IssueUpdate {
        title: args.title.clone(),
        description: args.description.clone(),
        status: args.status.map(Into::into),
        priority: args.priority,
        assignee,
        labels: args.labels.clone(),
        close_reason: None,
    };

    let issue = app.store().update(&id, updates).await?;
    let note = app.save_and_notify().await?;

    match mode {
        OutputMode::Json => print_json(&issue)?,
        OutputMode::Text => {
            println!("Updated {}", output::issue_line(&issue, config));
            if let Some(note) = note {
                println!("note: {note}");
            }
        }
    }
    Ok(())
}

async fn execute_close(
    app: &App,
    args: &CloseArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let ids: Vec<IssueId> = args.issue_ids.iter().map(IssueId::new).collect();
    let results = app
        .store()
        .close_many(&ids, Some(args.reason.clone()))
        .await;
    app.save_and_notify().await?;

    let mut failures = 0usize;
    match mode {
        OutputMode::Json => {
            let items: Vec<serde_json::Value> = results
                .iter()
                .map(|(id, result)| match result {
                    Ok(issue) => json!({"id": id, "ok": true, "status": issue.status}),
                    Err(e) => {
                        failures += 1;
                        json!({"id": id, "ok": false, "error": e.to_string()})
                    }
                })
                .collect();
            print_json(&items)?;
        }
        OutputMode::Text => {
            for (id, result) in &results {
                match result {
                    Ok(issue) => println!("Closed {}", output::issue_line(issue, config)),
                    Err(e) => {
                        failures += 1;
                        println!("Failed to close {id}: {e}");
                    }
                }
            }
        }
    }

    // Partial success is still a user-visible failure.
    if failures > 0 && failures == results.len() {
        anyhow::bail!("no issue could be closed");
    }
    Ok(())
}

async fn execute_reopen(
    app: &App,
    args: &ReopenArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let id = IssueId::new(args.issue_id.as_str());
    let issue = app.store().reopen(&id).await?;
    app.save_and_notify().await?;

    match mode {
        OutputMode::Json => print_json(&issue)?,
        OutputMode::Text => println!("Reopened {}", output::issue_line(&issue, config)),
    }
    Ok(())
}

async fn execute_delete(
    app: &App,
    args: &DeleteArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let id = IssueId::new(args.issue_id.as_str());
    let removed = app.store().remove(&id).await?;
    app.save_and_notify().await?;

    match mode {
        OutputMode::Json => print_json(&json!({"deleted": removed.id}))?,
        OutputMode::Text => println!("Deleted {}", output::issue_line(&removed, config)),
    }
    Ok(())
}

async fn execute_label(
    app: &App,
    args: &LabelArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let issue = match &args.action {
        LabelAction::Add { issue_id, label } => {
            app.store()
                .add_label(&IssueId::new(issue_id.as_str()), label)
                .await?
        }
        LabelAction::Remove { issue_id, label } => {
            app.store()
                .remove_label(&IssueId::new(issue_id.as_str()), label)
                .await?
        }
    };
    app.save_and_notify().await?;

    match mode {
        OutputMode::Json => print_json(&issue)?,
        OutputMode::Text => println!("{}", output::issue_line(&issue, config)),
    }
    Ok(())
}

async fn execute_dep(
    app: &App,
    args: &DepArgs,
    mode: OutputMode,
    _config: &OutputConfig,
) -> Result<()> {
    match &args.action {
        DepAction::Add { from, to, dep_type } => {
            let from = IssueId::new(from.as_str());
            let to = IssueId::new(to.as_str());
            app.store()
                .add_dependency(&from, &to, (*dep_type).into())
                .await?;
            app.save_and_notify().await?;
            match mode {
                OutputMode::Json => print_json(&json!({"added": {"from": from, "to": to}}))?,
                OutputMode::Text => println!("Added dependency {from} -> {to}"),
            }
        }
        DepAction::Remove { from, to, dep_type } => {
            let from = IssueId::new(from.as_str());
            let to = IssueId::new(to.as_str());
            app.store()
                .remove_dependency(&from, &to, (*dep_type).into())
                .await;
            app.save_and_notify().await?;
            match mode {
                OutputMode::Json => print_json(&json!({"removed": {"from": from, "to": to}}))?,
                OutputMode::Text => println!("Removed dependency {from} -> {to}"),
            }
        }
    }
    Ok(())
}

async fn execute_ready(
    app: &App,
    args: &ReadyArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let filter = IssueFilter {
        assignee: args.assignee.clone(),
        priority: args.priority,
        label: args.label.clone(),
        limit: args.limit,
        ..IssueFilter::default()
    };
    let ready = app.store().ready_issues(&filter).await;

    match mode {
        OutputMode::Json => print_json(&ready)?,
        OutputMode::Text => {
            if ready.is_empty() {
                println!("Nothing is ready to work on.");
            }
            for issue in ready {
                println!("{}", output::issue_line(&issue, config));
            }
        }
    }
    Ok(())
}

async fn execute_blocked(app: &App, mode: OutputMode, config: &OutputConfig) -> Result<()> {
    let blocked = app.store().blocked_issues().await;

    match mode {
        OutputMode::Json => {
            let items: Vec<serde_json::Value> = blocked
                .iter()
                .map(|(issue, blockers)| json!({"issue": issue, "blocked_by": blockers}))
                .collect();
            print_json(&items)?;
        }
        OutputMode::Text => {
            if blocked.is_empty() {
                println!("No blocked issues.");
            }
            for (issue, blockers) in blocked {
                println!("{}", output::blocked_line(&issue, &blockers, config));
            }
        }
    }
    Ok(())
}

async fn execute_tree(
    app: &App,
    args: &TreeArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let root = IssueId::new(args.issue_id.as_str());
    let tree = app.store().build_tree(&root, args.depth).await?;
    output::tree::print_tree(&tree, mode, config)?;
    Ok(())
}

async fn execute_chain(
    app: &App,
    args: &ChainArgs,
    mode: OutputMode,
    config: &OutputConfig,
) -> Result<()> {
    let from = IssueId::new(args.from.as_str());
    let to = IssueId::new(args.to.as_str());
    let path = app.store().dependency_chain(&from, &to).await?;

    match mode {
        OutputMode::Json => print_json(&path)?,
        OutputMode::Text => println!("{}", output::chain_line(&path, config)),
    }
    Ok(())
}

async fn execute_cycles(app: &App, mode: OutputMode, config: &OutputConfig) -> Result<()> {
    let cycles = app.store().detect_cycles().await;

    match mode {
        OutputMode::Json => print_json(&cycles)?,
        OutputMode::Text => {
            if cycles.is_empty() {
                println!("No cycles detected.");
            } else {
                println!("Found {} cycle(s):", cycles.len());
                for cycle in &cycles {
                    let mut loop_path = cycle.clone();
                    if let Some(first) = cycle.first() {
                        loop_path.push(first.clone());
                    }
                    println!("  {}", output::chain_line(&loop_path, config));
                }
            }
        }
    }

    Ok(())
}

async fn execute_export(app: &App, args: &ExportArgs) -> Result<()> {
    let (issues, dependencies) = app.store().snapshot().await;
    let lines = reconcile::render_records(&issues, &dependencies)?;

    match &args.output {
        Some(path) => {
            braid_jsonl::write_raw_lines_atomic(path, &lines).await?;
            println!("Exported {} issues to {}", issues.len(), path.display());
        }
        None => {
            for line in lines {
                println!("{line}");
            }
        }
    }
    Ok(())
}

async fn execute_import(app: &App, args: &ImportArgs, mode: OutputMode) -> Result<()> {
    let path = args.input.clone().unwrap_or_else(|| app.issues_path());
    let batch = reconcile::read_records(&path).await?;
    let report = app.store().import_batch(batch).await;
    app.save_and_notify().await?;

    match mode {
        OutputMode::Json => print_json(&report)?,
        OutputMode::Text => {
            println!(
                "Imported: {} new, {} updated, {} unchanged",
                report.created, report.updated, report.unchanged
            );
            if !report.tombstones.is_empty() {
                println!("Synthesized {} tombstone parent(s):", report.tombstones.len());
                for id in &report.tombstones {
                    println!("  {id}");
                }
            }
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
        }
    }
    Ok(())
}

async fn execute_duplicates(app: &App, mode: OutputMode, config: &OutputConfig) -> Result<()> {
    let groups = reconcile::find_duplicate_groups(app.store()).await;

    match mode {
        OutputMode::Json => print_json(&groups)?,
        OutputMode::Text => {
            if groups.is_empty() {
                println!("No duplicates found.");
            }
            for group in groups {
                println!(
                    "{} <= {}",
                    output::colorize_id(group.target.as_str(), config),
                    group
                        .sources
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
    }
    Ok(())
}

async fn execute_merge(app: &App, args: &MergeArgs, mode: OutputMode) -> Result<()> {
    let sources: Vec<IssueId> = args.sources.iter().map(IssueId::new).collect();
    let target = IssueId::new(args.target.as_str());

    let report = reconcile::merge_issues(app.store(), &sources, &target, args.dry_run).await?;
    if !args.dry_run {
        app.save_and_notify().await?;
    }

    match mode {
        OutputMode::Json => print_json(&report)?,
        OutputMode::Text => {
            let verb = if args.dry_run { "Would merge" } else { "Merged" };
            println!(
                "{verb} {} issue(s) into {} ({} edges migrated, {} dropped, {} references rewritten)",
                report.merged.len(),
                report.target,
                report.migrated_edges,
                report.dropped_edges,
                report.rewritten_refs
            );
        }
    }
    Ok(())
}

async fn execute_sync(app: &App, args: &SyncArgs, mode: OutputMode) -> Result<()> {
    let direct = args.direct || app.config().sync.no_daemon;

    if !direct {
        let client = app.daemon_client();
        match client.sync(true).await {
            Ok(payload) => {
                match mode {
                    OutputMode::Json => print_json(&json!({"via": "daemon", "report": payload}))?,
                    OutputMode::Text => println!("Sync cycle completed by daemon."),
                }
                return Ok(());
            }
            Err(e @ IpcError::VersionMismatch { .. }) => return Err(Error::from(e).into()),
            Err(e) => {
                client.cleanup_stale_socket().await;
                if let OutputMode::Text = mode {
                    println!("Daemon unreachable ({e}); running sync directly.");
                }
            }
        }
    }

    let reconciler = Reconciler::new(
        app.store().clone(),
        app.workspace_root().to_path_buf(),
        app.issues_path(),
    );
    let report = reconciler.run_cycle().await?;

    match mode {
        OutputMode::Json => print_json(&report)?,
        OutputMode::Text => println!(
            "Synced: {} issues exported, commit={}, push={}",
            report.exported, report.committed, report.pushed
        ),
    }
    Ok(())
}

async fn execute_daemon(args: &DaemonArgs, mode: OutputMode) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let root = config::find_workspace_root(&cwd).ok_or_else(|| {
        Error::Config("not a braid workspace (or any parent); run `braid init` first".to_string())
    })?;
    let client = DaemonClient::for_workspace(&root);

    match args.action {
        DaemonAction::Start => {
            if client.is_running().await {
                println!("Daemon already running.");
            } else {
                client.cleanup_stale_socket().await;
                spawn_daemon(&root)?;
                println!("Daemon started.");
            }
        }
        DaemonAction::Stop => match client.shutdown().await {
            Ok(()) => println!("Daemon stopped."),
            Err(IpcError::Unreachable { .. } | IpcError::Timeout { .. }) => {
                client.cleanup_stale_socket().await;
                println!("No daemon running.");
            }
            Err(e) => return Err(Error::from(e).into()),
        },
        DaemonAction::Restart => {
            if let Err(e) = client.shutdown().await {
                tracing::debug!("shutdown before restart: {e}");
            }
            // Give the old daemon a moment to release the socket.
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            client.cleanup_stale_socket().await;
            spawn_daemon(&root)?;
            println!("Daemon restarted.");
        }
        DaemonAction::Health => match client.health().await {
            Ok(payload) => match mode {
                OutputMode::Json => print_json(&payload)?,
                OutputMode::Text => {
                    println!("Daemon healthy.");
                    if let Some(payload) = payload {
                        println!("{}", serde_json::to_string_pretty(&payload)?);
                    }
                }
            },
            Err(e @ IpcError::VersionMismatch { .. }) => return Err(Error::from(e).into()),
            Err(e) => {
                println!("Daemon unreachable: {e}");
                anyhow::bail!("daemon is not healthy");
            }
        },
    }
    Ok(())
}

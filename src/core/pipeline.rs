use serde::Serialize;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::executor::HostCommandResult;
use crate::stage::Host;

/// Every task the engine can run. Task identity is a closed set resolved at
/// definition time; there is no runtime lookup by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    Setup,
    Fetch,
    FinalizeUpdate,
    Build,
    SymlinkShared,
    Activate,
    ClearOpcache,
    CacheClear,
    SiteOffline,
    SiteOnline,
    UpdateDb,
    Rollback,
}

/// Per-task failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Stop the pipeline run and mark the remaining tasks skipped.
    Abort,
    /// Record the failure and proceed to the next task.
    Continue,
}

impl TaskId {
    pub fn name(&self) -> &'static str {
        match self {
            TaskId::Setup => "setup",
            TaskId::Fetch => "fetch",
            TaskId::FinalizeUpdate => "finalize_update",
            TaskId::Build => "build",
            TaskId::SymlinkShared => "symlink_shared",
            TaskId::Activate => "activate",
            TaskId::ClearOpcache => "clear_opcache",
            TaskId::CacheClear => "cache_clear",
            TaskId::SiteOffline => "site_offline",
            TaskId::SiteOnline => "site_online",
            TaskId::UpdateDb => "update_db",
            TaskId::Rollback => "rollback",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TaskId::Setup => "Provision the release and shared directory layout",
            TaskId::Fetch => "Fetch the revision into a fresh release directory",
            TaskId::FinalizeUpdate => "Ensure group-writability of the staged release",
            TaskId::Build => "Build the release from its manifest and strip stock files",
            TaskId::SymlinkShared => "Link persistent shared assets into the release",
            TaskId::Activate => "Point the current symlink at the release",
            TaskId::ClearOpcache => "Clear the in-process opcode cache over HTTP",
            TaskId::CacheClear => "Clear the application cache",
            TaskId::SiteOffline => "Put the site into maintenance mode",
            TaskId::SiteOnline => "Take the site out of maintenance mode",
            TaskId::UpdateDb => "Run pending database migrations",
            TaskId::Rollback => "Point the current symlink back at the previous release",
        }
    }

    /// Role filter; empty means every host in the stage.
    pub fn roles(&self) -> &'static [&'static str] {
        match self {
            TaskId::FinalizeUpdate => &["web"],
            _ => &[],
        }
    }

    pub fn on_error(&self) -> OnError {
        match self {
            TaskId::CacheClear | TaskId::SiteOffline | TaskId::SiteOnline | TaskId::UpdateDb => {
                OnError::Continue
            }
            _ => OnError::Abort,
        }
    }

    /// Most tasks need a resolved release; fleet bootstrap does not.
    pub fn requires_release(&self) -> bool {
        !matches!(self, TaskId::Setup)
    }
}

/// A pipeline entry point: a root task plus its registered post-hooks.
/// Hooks run after their task, in declaration order, recursively.
#[derive(Debug, Clone)]
pub struct PipelineDef {
    pub root: TaskId,
    hooks: Vec<(TaskId, Vec<TaskId>)>,
}

impl PipelineDef {
    pub fn new(root: TaskId) -> Self {
        Self {
            root,
            hooks: Vec::new(),
        }
    }

    pub fn after(mut self, task: TaskId, hooks: &[TaskId]) -> Self {
        self.hooks.push((task, hooks.to_vec()));
        self
    }

    pub fn hooks_for(&self, task: TaskId) -> &[TaskId] {
        self.hooks
            .iter()
            .find(|(t, _)| *t == task)
            .map(|(_, hooks)| hooks.as_slice())
            .unwrap_or(&[])
    }

    /// Flatten root + transitive post-hooks into the execution order.
    /// A task reached through two parents runs once; a cycle is a
    /// configuration error.
    pub fn resolve_order(&self) -> Result<Vec<TaskId>> {
        let mut order = Vec::new();
        let mut stack = Vec::new();
        self.expand(self.root, &mut order, &mut stack)?;
        Ok(order)
    }

    fn expand(&self, task: TaskId, order: &mut Vec<TaskId>, stack: &mut Vec<TaskId>) -> Result<()> {
        if stack.contains(&task) {
            return Err(Error::config_invalid_value(
                "pipeline",
                Some(task.name().to_string()),
                "Post-hook registrations contain a cycle",
            ));
        }
        if order.contains(&task) {
            return Ok(());
        }

        order.push(task);
        stack.push(task);
        for hook in self.hooks_for(task) {
            self.expand(*hook, order, stack)?;
        }
        stack.pop();
        Ok(())
    }
}

// ============================================================================
// Entry-point pipeline definitions
// ============================================================================

pub fn setup() -> PipelineDef {
    PipelineDef::new(TaskId::Setup)
}

pub fn deploy() -> PipelineDef {
    PipelineDef::new(TaskId::Fetch).after(
        TaskId::Fetch,
        &[
            TaskId::FinalizeUpdate,
            TaskId::Build,
            TaskId::SymlinkShared,
            TaskId::Activate,
            TaskId::ClearOpcache,
            TaskId::CacheClear,
        ],
    )
}

pub fn rollback() -> PipelineDef {
    PipelineDef::new(TaskId::Rollback)
        .after(TaskId::Rollback, &[TaskId::ClearOpcache, TaskId::CacheClear])
}

pub fn cache_clear() -> PipelineDef {
    PipelineDef::new(TaskId::CacheClear)
}

/// Migrations run inside a maintenance window: offline, migrate, then clear
/// caches and come back online.
pub fn db_migrate() -> PipelineDef {
    PipelineDef::new(TaskId::SiteOffline)
        .after(TaskId::SiteOffline, &[TaskId::UpdateDb])
        .after(TaskId::UpdateDb, &[TaskId::CacheClear, TaskId::SiteOnline])
}

// ============================================================================
// Execution
// ============================================================================

/// Executes one task's body against its resolved hosts.
///
/// `Ok` carries per-host command outcomes (non-zero exits included), judged
/// by the task's error policy. `Err` is reserved for fatal conditions:
/// configuration errors and connection/authentication failures.
pub trait TaskRunner {
    fn run_task(
        &self,
        task: TaskId,
        ctx: &RunContext,
        hosts: &[Host],
    ) -> Result<Vec<HostCommandResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Only continue-policy tasks failed; the cutover itself completed.
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostReport {
    pub host: String,
    pub success: bool,
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task: TaskId,
    pub description: String,
    pub status: TaskStatus,
    pub on_error: OnError,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<HostReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub stage_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    pub status: RunStatus,
    pub tasks: Vec<TaskReport>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Failed => 1,
            _ => 0,
        }
    }
}

const OUTPUT_EXCERPT_LEN: usize = 200;

fn excerpt(result: &HostCommandResult) -> String {
    let raw = if result.stderr.trim().is_empty() {
        &result.stdout
    } else {
        &result.stderr
    };
    let trimmed = raw.trim();
    if trimmed.len() <= OUTPUT_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let mut cut = OUTPUT_EXCERPT_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &trimmed[..cut])
}

fn host_reports(results: &[HostCommandResult]) -> Vec<HostReport> {
    results
        .iter()
        .map(|r| HostReport {
            host: r.host.clone(),
            success: r.success,
            exit_code: r.exit_code,
            output: excerpt(r),
        })
        .collect()
}

/// Hosts a task targets: the stage fleet (already narrowed by any operator
/// host override) filtered by the task's role set.
pub fn target_hosts(ctx: &RunContext, task: TaskId) -> Result<Vec<Host>> {
    let roles = task.roles();
    let matched: Vec<Host> = ctx
        .hosts
        .iter()
        .filter(|h| roles.is_empty() || roles.iter().any(|role| h.has_role(role)))
        .cloned()
        .collect();

    if matched.is_empty() {
        return Err(Error::deploy_no_target_hosts(
            task.name(),
            roles.iter().map(|r| r.to_string()).collect(),
        ));
    }

    Ok(matched)
}

/// Run a pipeline definition to completion.
///
/// Tasks run strictly in resolved order. A fatal error or an abort-policy
/// failure marks every remaining task skipped and fails the run; the report
/// always covers the full resolved order.
pub fn run(def: &PipelineDef, ctx: &RunContext, runner: &dyn TaskRunner) -> Result<RunReport> {
    let order = def.resolve_order()?;
    let mut reports: Vec<TaskReport> = Vec::with_capacity(order.len());
    let mut aborted = false;
    let mut continue_failures = false;

    for task in order.iter().copied() {
        if aborted {
            reports.push(TaskReport {
                task,
                description: task.description().to_string(),
                status: TaskStatus::Skipped,
                on_error: task.on_error(),
                error: None,
                hosts: Vec::new(),
            });
            continue;
        }

        let outcome = execute_task(ctx, runner, task);
        let report = match outcome {
            Ok(results) => {
                let failed = results.iter().any(|r| !r.success);
                TaskReport {
                    task,
                    description: task.description().to_string(),
                    status: if failed {
                        TaskStatus::Failed
                    } else {
                        TaskStatus::Success
                    },
                    on_error: task.on_error(),
                    error: None,
                    hosts: host_reports(&results),
                }
            }
            Err(err) => TaskReport {
                task,
                description: task.description().to_string(),
                status: TaskStatus::Failed,
                on_error: task.on_error(),
                error: Some(err.message_with_details()),
                hosts: Vec::new(),
            },
        };

        let fatal = report.error.is_some();
        if report.status == TaskStatus::Failed {
            if fatal || task.on_error() == OnError::Abort {
                aborted = true;
            } else {
                continue_failures = true;
                log_status!(
                    "pipeline",
                    "Task '{}' failed on {} host(s); continuing",
                    task.name(),
                    report.hosts.iter().filter(|h| !h.success).count()
                );
            }
        }

        reports.push(report);
    }

    let failed = reports
        .iter()
        .filter(|r| r.status == TaskStatus::Failed)
        .count();
    let skipped = reports
        .iter()
        .filter(|r| r.status == TaskStatus::Skipped)
        .count();
    let succeeded = reports.len() - failed - skipped;

    let status = if aborted {
        RunStatus::Failed
    } else if continue_failures {
        RunStatus::PartialSuccess
    } else {
        RunStatus::Success
    };

    Ok(RunReport {
        stage_id: ctx.stage_id.clone(),
        release: ctx.release.as_ref().map(|r| r.id.clone()),
        status,
        tasks: reports,
        summary: RunSummary {
            total_tasks: order.len(),
            succeeded,
            failed,
            skipped,
        },
    })
}

fn execute_task(
    ctx: &RunContext,
    runner: &dyn TaskRunner,
    task: TaskId,
) -> Result<Vec<HostCommandResult>> {
    if task.requires_release() && ctx.release.is_none() {
        return Err(Error::deploy_no_release(ctx.stage_id.clone()));
    }

    let hosts = target_hosts(ctx, task)?;
    log_status!(
        "pipeline",
        "Running '{}' on {} host(s)",
        task.name(),
        hosts.len()
    );
    runner.run_task(task, ctx, &hosts)
}

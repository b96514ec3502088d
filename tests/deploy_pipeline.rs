//! End-to-end pipeline runs against a recording fake executor: command
//! ordering, per-task policies, and the configuration-error guardrails.

use std::sync::Mutex;

use stagehand::context::{ReleaseMode, RunContext};
use stagehand::executor::{HostCommandResult, RemoteExecutor};
use stagehand::pipeline::{self, RunStatus, TaskId, TaskStatus};
use stagehand::stage::{Host, Stage};
use stagehand::tasks::StepRunner;
use stagehand::{Error, Result};

#[derive(Debug, Clone)]
struct RecordedRun {
    command: String,
    hosts: Vec<String>,
}

#[derive(Default)]
struct FakeExecutor {
    runs: Mutex<Vec<RecordedRun>>,
    queries: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, String)>>,
    /// Listing served for `ls -1 <releasesRoot>`.
    release_listing: Vec<String>,
    /// Listing served for `ls -1 <releaseRoot>` (manifest discovery).
    manifest_listing: Vec<String>,
    /// Target served for `readlink <current>`.
    current_target: Option<String>,
    /// Commands containing this substring fail with exit 1 on every host.
    fail_matching: Option<String>,
}

impl FakeExecutor {
    fn new() -> Self {
        Self {
            manifest_listing: vec!["example.make".to_string(), "profiles".to_string()],
            ..Self::default()
        }
    }

    fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<String> {
        self.recorded_runs().into_iter().map(|r| r.command).collect()
    }

    fn result_for(&self, host: &Host, command: &str) -> HostCommandResult {
        let failed = self
            .fail_matching
            .as_deref()
            .map(|needle| command.contains(needle))
            .unwrap_or(false);
        HostCommandResult {
            host: host.host.clone(),
            command: command.to_string(),
            success: !failed,
            exit_code: if failed { 1 } else { 0 },
            stdout: String::new(),
            stderr: if failed { "boom".to_string() } else { String::new() },
        }
    }
}

impl RemoteExecutor for FakeExecutor {
    fn run(
        &self,
        hosts: &[Host],
        command: &str,
        stop_on_failure: bool,
    ) -> Result<Vec<HostCommandResult>> {
        let _ = stop_on_failure;
        self.runs.lock().unwrap().push(RecordedRun {
            command: command.to_string(),
            hosts: hosts.iter().map(|h| h.host.clone()).collect(),
        });
        Ok(hosts.iter().map(|h| self.result_for(h, command)).collect())
    }

    fn query(&self, host: &Host, command: &str) -> Result<Vec<String>> {
        let _ = host;
        self.queries.lock().unwrap().push(command.to_string());

        if command.starts_with("readlink") {
            return match &self.current_target {
                Some(target) => Ok(vec![target.clone()]),
                None => Err(Error::internal_unexpected("no current pointer")),
            };
        }

        // `ls -1` against either the releases root or a release root.
        if command.contains("/releases/") {
            Ok(self.manifest_listing.clone())
        } else {
            Ok(self.release_listing.clone())
        }
    }

    fn upload(
        &self,
        hosts: &[Host],
        content: &str,
        remote_path: &str,
    ) -> Result<Vec<HostCommandResult>> {
        self.uploads
            .lock()
            .unwrap()
            .push((remote_path.to_string(), content.to_string()));
        Ok(hosts
            .iter()
            .map(|h| self.result_for(h, remote_path))
            .collect())
    }
}

fn production_stage() -> Stage {
    serde_json::from_str(
        r#"{
            "application": "example",
            "appUrl": "https://www.example.com",
            "repository": "git@git.example.com:site.git",
            "hosts": [
                {"host": "web1", "user": "deploy", "roles": ["web"]},
                {"host": "web2", "user": "deploy", "roles": ["web"]}
            ]
        }"#,
    )
    .unwrap()
}

fn build_context(executor: &FakeExecutor, mode: ReleaseMode) -> RunContext {
    RunContext::build("production", production_stage(), &[], mode, executor).unwrap()
}

#[test]
fn deploy_runs_the_full_cutover_in_order() {
    let executor = FakeExecutor::new();
    let ctx = build_context(&executor, ReleaseMode::Mint);
    let release_path = ctx.release.as_ref().unwrap().path.clone();

    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&pipeline::deploy(), &ctx, &runner).unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.summary.skipped, 0);

    let commands = executor.commands();

    // Fetch stages the release, then the group-writability pass.
    assert!(commands[0].starts_with("git clone --depth 1 --branch master"));
    assert!(commands[0].contains(&release_path));
    assert!(commands[1].starts_with("chmod -R g+w"));

    // Build from the single manifest, then strip the stock files.
    assert!(commands[2].contains("drush make example.make ."));
    assert!(commands[3].starts_with("rm -f"));
    assert!(commands[3].contains("LICENSE.txt"));
    assert!(commands[3].contains("UPGRADE.txt"));

    // Shared-asset links: files, private, settings.php, robots.txt, .htaccess.
    let links: Vec<&String> = commands
        .iter()
        .filter(|c| c.contains("ln -nfs") && c.contains("/shared/"))
        .collect();
    assert_eq!(links.len(), 5);
    assert!(links[0].contains("sites/default/files"));
    assert!(links[2].contains("sites/default/settings.php"));
    assert!(links[3].contains("robots.txt"));
    assert!(links[4].contains(".htaccess"));

    // Activation happens after every link and points current at the release.
    let activate_pos = commands
        .iter()
        .position(|c| c.contains("mv -fT") && c.contains("/current"))
        .unwrap();
    let last_link_pos = commands
        .iter()
        .rposition(|c| c.contains("/shared/"))
        .unwrap();
    assert!(activate_pos > last_link_pos);
    assert!(commands[activate_pos].contains(&release_path));

    // Cache invalidation closes the run: script fetch, then cc all.
    let uploads = executor.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, format!("{}/opcache_clear.php", release_path));
    assert!(uploads[0].1.contains("opcache_reset"));
    drop(uploads);

    let curl_pos = commands.iter().position(|c| c.starts_with("curl")).unwrap();
    assert!(curl_pos > activate_pos);
    assert!(commands[curl_pos].contains("https://www.example.com/opcache_clear.php"));
    assert!(commands.last().unwrap().contains("cc all"));

    // Every fleet-wide command ran on both hosts.
    for run in executor.recorded_runs() {
        assert_eq!(run.hosts, vec!["web1".to_string(), "web2".to_string()]);
    }
}

#[test]
fn ambiguous_manifest_aborts_the_build_step_before_any_destructive_command() {
    let executor = FakeExecutor {
        manifest_listing: vec!["a.make".to_string(), "b.make".to_string()],
        ..FakeExecutor::new()
    };
    let ctx = build_context(&executor, ReleaseMode::Mint);

    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&pipeline::deploy(), &ctx, &runner).unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);

    let by_task = |t: TaskId| report.tasks.iter().find(|r| r.task == t).unwrap();
    assert_eq!(by_task(TaskId::Fetch).status, TaskStatus::Success);
    assert_eq!(by_task(TaskId::Build).status, TaskStatus::Failed);
    assert!(by_task(TaskId::Build)
        .error
        .as_deref()
        .unwrap()
        .contains("deploy.manifest_ambiguous"));
    assert_eq!(by_task(TaskId::SymlinkShared).status, TaskStatus::Skipped);
    assert_eq!(by_task(TaskId::Activate).status, TaskStatus::Skipped);
    assert_eq!(by_task(TaskId::CacheClear).status, TaskStatus::Skipped);

    // The build step only listed the release root; it issued no command.
    let commands = executor.commands();
    assert_eq!(commands.len(), 2, "only fetch and finalize ran: {:?}", commands);
    assert!(!commands.iter().any(|c| c.contains("make")));
    assert!(!commands.iter().any(|c| c.starts_with("rm")));
    assert!(executor.uploads.lock().unwrap().is_empty());
}

#[test]
fn missing_manifest_is_rejected_the_same_way() {
    let executor = FakeExecutor {
        manifest_listing: vec!["profiles".to_string()],
        ..FakeExecutor::new()
    };
    let ctx = build_context(&executor, ReleaseMode::Mint);

    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&pipeline::deploy(), &ctx, &runner).unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    let build = report
        .tasks
        .iter()
        .find(|r| r.task == TaskId::Build)
        .unwrap();
    assert!(build
        .error
        .as_deref()
        .unwrap()
        .contains("deploy.manifest_missing"));
}

#[test]
fn continue_policy_failure_still_runs_the_remaining_hooks() {
    let executor = FakeExecutor {
        fail_matching: Some("cc all".to_string()),
        release_listing: vec!["20240101120000".to_string()],
        ..FakeExecutor::new()
    };
    let ctx = build_context(&executor, ReleaseMode::Latest);

    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&pipeline::db_migrate(), &ctx, &runner).unwrap();

    // Cache clear failed, but the site still came back online.
    assert_eq!(report.status, RunStatus::PartialSuccess);
    assert_eq!(report.exit_code(), 0);

    let commands = executor.commands();
    assert!(commands
        .last()
        .unwrap()
        .contains("vset maintenance_mode 0 -y"));
    let by_task = |t: TaskId| report.tasks.iter().find(|r| r.task == t).unwrap();
    assert_eq!(by_task(TaskId::CacheClear).status, TaskStatus::Failed);
    assert_eq!(by_task(TaskId::SiteOnline).status, TaskStatus::Success);
}

#[test]
fn abort_policy_failure_halts_the_pipeline() {
    let executor = FakeExecutor {
        fail_matching: Some("git clone".to_string()),
        ..FakeExecutor::new()
    };
    let ctx = build_context(&executor, ReleaseMode::Mint);

    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&pipeline::deploy(), &ctx, &runner).unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.skipped, report.summary.total_tasks - 1);

    // Nothing but the fetch reached the fleet.
    assert_eq!(executor.commands().len(), 1);
}

#[test]
fn db_migrate_wraps_migrations_in_a_maintenance_window() {
    let executor = FakeExecutor {
        release_listing: vec!["20240101120000".to_string()],
        ..FakeExecutor::new()
    };
    let ctx = build_context(&executor, ReleaseMode::Latest);
    assert_eq!(ctx.release.as_ref().unwrap().id, "20240101120000");

    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&pipeline::db_migrate(), &ctx, &runner).unwrap();
    assert_eq!(report.status, RunStatus::Success);

    let commands = executor.commands();
    let offline = commands
        .iter()
        .position(|c| c.contains("vset site_offline 1"))
        .unwrap();
    let migrate = commands
        .iter()
        .position(|c| c.contains("updatedb -y"))
        .unwrap();
    let cache = commands.iter().position(|c| c.contains("cc all")).unwrap();
    let online = commands
        .iter()
        .position(|c| c.contains("vset site_offline 0"))
        .unwrap();
    assert!(offline < migrate && migrate < cache && cache < online);
}

#[test]
fn cache_clear_targets_the_latest_staged_release() {
    let executor = FakeExecutor {
        release_listing: vec![
            "20231231000000".to_string(),
            "20240101120000".to_string(),
            "current".to_string(),
        ],
        ..FakeExecutor::new()
    };
    let ctx = build_context(&executor, ReleaseMode::Latest);
    assert_eq!(ctx.release.as_ref().unwrap().id, "20240101120000");

    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&pipeline::cache_clear(), &ctx, &runner).unwrap();
    assert_eq!(report.status, RunStatus::Success);

    let commands = executor.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].contains("/releases/20240101120000"));
    assert!(commands[0].contains("cc all"));
}

#[test]
fn rollback_repoints_current_at_the_previous_release_and_invalidates() {
    let executor = FakeExecutor {
        release_listing: vec![
            "20231201000000".to_string(),
            "20240101120000".to_string(),
            "20240201120000".to_string(),
        ],
        current_target: Some("/var/www/example/releases/20240201120000".to_string()),
        ..FakeExecutor::new()
    };
    let ctx = build_context(&executor, ReleaseMode::Previous);
    assert_eq!(ctx.release.as_ref().unwrap().id, "20240101120000");

    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&pipeline::rollback(), &ctx, &runner).unwrap();
    assert_eq!(report.status, RunStatus::Success);

    let commands = executor.commands();
    assert!(commands[0].contains("ln -nfs '/var/www/example/releases/20240101120000'"));
    assert!(commands[0].contains("mv -fT"));
    assert!(commands
        .iter()
        .any(|c| c.contains("cc all") && c.contains("/releases/20240101120000")));
}

#[test]
fn setup_is_idempotent_at_the_command_level() {
    let executor = FakeExecutor::new();
    let ctx = build_context(&executor, ReleaseMode::None);
    let runner = StepRunner::new(&executor);

    let first = pipeline::run(&pipeline::setup(), &ctx, &runner).unwrap();
    assert_eq!(first.status, RunStatus::Success);
    let first_commands = executor.commands();

    let second = pipeline::run(&pipeline::setup(), &ctx, &runner).unwrap();
    assert_eq!(second.status, RunStatus::Success);
    let all_commands = executor.commands();

    // The re-run issues exactly the same create-if-missing/assert commands.
    assert_eq!(all_commands.len(), first_commands.len() * 2);
    assert_eq!(&all_commands[first_commands.len()..], &first_commands[..]);
    for command in &first_commands {
        assert!(
            command.starts_with("mkdir -p")
                || command.starts_with("chown -R")
                || command.starts_with("chmod -R"),
            "unexpected setup command: {}",
            command
        );
    }
}

#[test]
fn setup_honors_a_single_host_override() {
    let executor = FakeExecutor::new();
    let ctx = RunContext::build(
        "production",
        production_stage(),
        &["web2".to_string()],
        ReleaseMode::None,
        &executor,
    )
    .unwrap();

    let runner = StepRunner::new(&executor);
    pipeline::run(&pipeline::setup(), &ctx, &runner).unwrap();

    for run in executor.recorded_runs() {
        assert_eq!(run.hosts, vec!["web2".to_string()]);
    }
}

#[test]
fn no_release_on_the_fleet_is_a_configuration_error() {
    let executor = FakeExecutor::new(); // empty releases root
    let err = RunContext::build(
        "production",
        production_stage(),
        &[],
        ReleaseMode::Latest,
        &executor,
    )
    .unwrap_err();
    assert_eq!(err.code, stagehand::ErrorCode::DeployNoRelease);
}

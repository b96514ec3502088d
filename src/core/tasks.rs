//! Production task bodies: the dispatch from task identity to the step
//! modules, executed against the remote executor.

use std::collections::HashMap;

use crate::assets;
use crate::build;
use crate::cache;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::executor::{HostCommandResult, RemoteExecutor};
use crate::pipeline::{TaskId, TaskRunner};
use crate::release;
use crate::stage::Host;
use crate::utils::template::{self, TemplateVars};

pub struct StepRunner<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> StepRunner<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// Render and run the opaque fetch command that stages the revision
    /// into the release directory.
    fn run_fetch(&self, ctx: &RunContext, hosts: &[Host]) -> Result<Vec<HostCommandResult>> {
        let release_path = ctx.release_path()?;
        let template_str = &ctx.stage.fetch_command;

        if template_str.contains("{{repository}}") && ctx.stage.repository.is_none() {
            return Err(Error::config_missing_key("repository", None)
                .with_hint("Set the stage's repository or a fetchCommand that does not need one"));
        }

        let mut vars = HashMap::new();
        if let Some(repository) = &ctx.stage.repository {
            vars.insert(TemplateVars::REPOSITORY.to_string(), repository.clone());
        }
        vars.insert(TemplateVars::BRANCH.to_string(), ctx.stage.branch.clone());
        vars.insert(
            TemplateVars::RELEASE_PATH.to_string(),
            release_path.to_string(),
        );

        let command = template::render_map(template_str, &vars);
        log_status!("fetch", "Staging release {} on {} host(s)", release_path, hosts.len());
        self.executor.run(hosts, &command, true)
    }
}

impl TaskRunner for StepRunner<'_> {
    fn run_task(
        &self,
        task: TaskId,
        ctx: &RunContext,
        hosts: &[Host],
    ) -> Result<Vec<HostCommandResult>> {
        match task {
            TaskId::Setup => release::run_setup(self.executor, ctx, hosts),
            TaskId::Fetch => self.run_fetch(ctx, hosts),
            TaskId::FinalizeUpdate => release::run_finalize(self.executor, ctx, hosts),
            TaskId::Build => build::run(self.executor, ctx, hosts),
            TaskId::SymlinkShared => assets::run(self.executor, ctx, hosts),
            TaskId::Activate | TaskId::Rollback => {
                release::run_activate(self.executor, ctx, hosts)
            }
            TaskId::ClearOpcache => cache::run_opcache_clear(self.executor, ctx, hosts),
            TaskId::CacheClear => cache::run_cache_clear(self.executor, ctx, hosts),
            TaskId::SiteOffline => cache::run_maintenance(self.executor, ctx, hosts, true),
            TaskId::SiteOnline => cache::run_maintenance(self.executor, ctx, hosts, false),
            TaskId::UpdateDb => cache::run_update_db(self.executor, ctx, hosts),
        }
    }
}

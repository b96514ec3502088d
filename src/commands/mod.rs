use clap::Args;
use serde::Serialize;

use stagehand::context::{ReleaseMode, RunContext};
use stagehand::executor::SshExecutor;
use stagehand::pipeline::{self, PipelineDef, RunReport};
use stagehand::tasks::StepRunner;

pub mod cache;
pub mod db;
pub mod deploy;
pub mod rollback;
pub mod setup;
pub mod stage;

pub type CmdResult<T> = stagehand::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Arguments shared by every pipeline entry point.
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Stage ID (e.g. production)
    pub stage_id: String,

    /// Limit the run to specific hosts from the stage (can be repeated)
    #[arg(long = "host", value_name = "HOST")]
    pub hosts: Vec<String>,
}

#[derive(Serialize)]
pub struct PipelineOutput {
    pub command: String,
    pub hosts: Vec<String>,
    #[serde(flatten)]
    pub report: RunReport,
}

/// Load the stage, build the run context, and drive the pipeline over SSH.
pub(crate) fn run_pipeline(
    command: &str,
    args: &PipelineArgs,
    mode: ReleaseMode,
    def: PipelineDef,
    override_stage: impl FnOnce(&mut stagehand::stage::Stage),
) -> CmdResult<PipelineOutput> {
    let mut stage = stagehand::stage::load(&args.stage_id)?;
    override_stage(&mut stage);

    let executor = SshExecutor::new(stage.max_connections);
    let ctx = RunContext::build(&args.stage_id, stage, &args.hosts, mode, &executor)?;
    let runner = StepRunner::new(&executor);
    let report = pipeline::run(&def, &ctx, &runner)?;

    let exit_code = report.exit_code();
    Ok((
        PipelineOutput {
            command: command.to_string(),
            hosts: ctx.hosts.iter().map(|h| h.host.clone()).collect(),
            report,
        },
        exit_code,
    ))
}

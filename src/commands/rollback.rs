use clap::Args;

use stagehand::context::ReleaseMode;
use stagehand::pipeline;

use super::{CmdResult, PipelineArgs, PipelineOutput};

#[derive(Args)]
pub struct RollbackArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub fn run(args: RollbackArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PipelineOutput> {
    super::run_pipeline(
        "rollback.run",
        &args.pipeline,
        ReleaseMode::Previous,
        pipeline::rollback(),
        |_| {},
    )
}

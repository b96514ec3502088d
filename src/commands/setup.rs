use clap::Args;

use stagehand::context::ReleaseMode;
use stagehand::pipeline;

use super::{CmdResult, PipelineArgs, PipelineOutput};

#[derive(Args)]
pub struct SetupArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub fn run(args: SetupArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PipelineOutput> {
    super::run_pipeline(
        "setup.run",
        &args.pipeline,
        ReleaseMode::None,
        pipeline::setup(),
        |_| {},
    )
}

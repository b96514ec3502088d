use clap::Args;

use stagehand::context::ReleaseMode;
use stagehand::pipeline;

use super::{CmdResult, PipelineArgs, PipelineOutput};

#[derive(Args)]
pub struct CacheClearArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub fn run(args: CacheClearArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PipelineOutput> {
    super::run_pipeline(
        "cache.clear",
        &args.pipeline,
        ReleaseMode::Latest,
        pipeline::cache_clear(),
        |_| {},
    )
}

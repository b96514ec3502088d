use clap::Args;

use stagehand::context::ReleaseMode;
use stagehand::pipeline;

use super::{CmdResult, PipelineArgs, PipelineOutput};

#[derive(Args)]
pub struct DbMigrateArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub fn run(args: DbMigrateArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PipelineOutput> {
    super::run_pipeline(
        "db.migrate",
        &args.pipeline,
        ReleaseMode::Latest,
        pipeline::db_migrate(),
        |_| {},
    )
}

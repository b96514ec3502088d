use clap::Args;

use stagehand::context::ReleaseMode;
use stagehand::pipeline;

use super::{CmdResult, PipelineArgs, PipelineOutput};

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Deploy a branch other than the stage's configured one
    #[arg(long)]
    pub branch: Option<String>,
}

pub fn run(args: DeployArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PipelineOutput> {
    super::run_pipeline(
        "deploy.run",
        &args.pipeline,
        ReleaseMode::Mint,
        pipeline::deploy(),
        |stage| {
            if let Some(branch) = args.branch.clone() {
                stage.branch = branch;
            }
        },
    )
    .map_err(|e| {
        if e.code == stagehand::ErrorCode::ConfigMissingKey {
            e.with_hint(format!(
                "Run 'stagehand stage set {} --json '{{\"repository\": \"...\"}}'' to configure the stage",
                args.pipeline.stage_id
            ))
        } else {
            e
        }
    })
}

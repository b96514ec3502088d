use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{cache, db, deploy, rollback, setup, stage, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(version = VERSION)]
#[command(about = "CLI for staged, multi-host CMS release deployment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the release/shared layout on a stage's hosts
    Setup(setup::SetupArgs),
    /// Stage, build, link, activate and invalidate a new release
    Deploy(deploy::DeployArgs),
    /// Point the fleet back at the previous release
    Rollback(rollback::RollbackArgs),
    /// Clear the application cache on the current release
    #[command(name = "cache-clear")]
    CacheClear(cache::CacheClearArgs),
    /// Run pending database migrations inside a maintenance window
    #[command(name = "db-migrate")]
    DbMigrate(db::DbMigrateArgs),
    /// Manage stage configurations
    #[command(visible_alias = "stages")]
    Stage(stage::StageArgs),
}

fn run_json(command: Commands, global: &GlobalArgs) -> (stagehand::Result<serde_json::Value>, i32) {
    match command {
        Commands::Setup(args) => output::map_cmd_result_to_json(setup::run(args, global)),
        Commands::Deploy(args) => output::map_cmd_result_to_json(deploy::run(args, global)),
        Commands::Rollback(args) => output::map_cmd_result_to_json(rollback::run(args, global)),
        Commands::CacheClear(args) => output::map_cmd_result_to_json(cache::run(args, global)),
        Commands::DbMigrate(args) => output::map_cmd_result_to_json(db::run(args, global)),
        Commands::Stage(args) => output::map_cmd_result_to_json(stage::run(args, global)),
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = run_json(cli.command, &global);
    output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}

//! Shared-asset linking: persistent data and environment-specific config
//! survive across releases by replacing the release-local copies with
//! symlinks into the shared directory.

use crate::context::{LayoutPaths, RunContext};
use crate::error::{Error, Result};
use crate::executor::{HostCommandResult, RemoteExecutor};
use crate::stage::{Host, Stage};
use crate::utils::shell;

/// One rm-and-relink command. The release-local copy (freshly delivered by
/// fetch/build) is removed, then the same path is pointed into shared/.
fn link_command(release_local: &str, shared_target: &str) -> String {
    format!(
        "rm -rf {} && ln -nfs {} {}",
        shell::quote_path(release_local),
        shell::quote_path(shared_target),
        shell::quote_path(release_local)
    )
}

/// Every link command for a release, in order: the always-shared assets
/// under the shared subroot, then the operator-configurable override files
/// at the release root.
pub fn link_commands(stage: &Stage, paths: &LayoutPaths, release_path: &str) -> Vec<String> {
    let mut commands = Vec::new();

    for asset in &stage.always_shared_assets {
        let release_local = format!("{}/{}/{}", release_path, stage.shared_subroot, asset);
        commands.push(link_command(&release_local, &paths.shared(asset)));
    }

    for file in &stage.override_assets {
        let release_local = format!("{}/{}", release_path, file);
        commands.push(link_command(&release_local, &paths.shared(file)));
    }

    commands
}

/// Link every shared asset on every target host. Each asset is independent:
/// a failed link does not stop the remaining assets from being attempted,
/// and any failure fails the task.
pub fn run(
    executor: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
) -> Result<Vec<HostCommandResult>> {
    let release_path = ctx.release_path()?;
    let commands = link_commands(&ctx.stage, &ctx.paths, release_path);
    if commands.is_empty() {
        return Err(Error::config_invalid_value(
            "alwaysSharedAssets",
            None,
            "Stage declares no shared assets to link",
        ));
    }

    let mut results = Vec::new();
    for command in commands {
        results.extend(executor.run(hosts, &command, false)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stage() -> Stage {
        serde_json::from_str(
            r#"{
                "application": "example",
                "hosts": [{"host": "web1", "user": "deploy", "roles": ["web"]}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn always_shared_assets_link_under_the_shared_subroot() {
        let stage = test_stage();
        let paths = LayoutPaths::for_deploy_root("/var/www/example");
        let commands = link_commands(&stage, &paths, "/var/www/example/releases/20240101120000");

        assert_eq!(
            commands[0],
            "rm -rf '/var/www/example/releases/20240101120000/sites/default/files' \
             && ln -nfs '/var/www/example/shared/files' \
             '/var/www/example/releases/20240101120000/sites/default/files'"
        );
        assert_eq!(
            commands[2],
            "rm -rf '/var/www/example/releases/20240101120000/sites/default/settings.php' \
             && ln -nfs '/var/www/example/shared/settings.php' \
             '/var/www/example/releases/20240101120000/sites/default/settings.php'"
        );
    }

    #[test]
    fn override_assets_link_at_the_release_root() {
        let stage = test_stage();
        let paths = LayoutPaths::for_deploy_root("/var/www/example");
        let commands = link_commands(&stage, &paths, "/var/www/example/releases/20240101120000");

        // After the three always-shared assets come robots.txt and .htaccess.
        assert_eq!(commands.len(), 5);
        assert_eq!(
            commands[3],
            "rm -rf '/var/www/example/releases/20240101120000/robots.txt' \
             && ln -nfs '/var/www/example/shared/robots.txt' \
             '/var/www/example/releases/20240101120000/robots.txt'"
        );
    }

    #[test]
    fn removal_and_link_target_the_same_path() {
        let stage = test_stage();
        let paths = LayoutPaths::for_deploy_root("/var/www/example");
        for command in link_commands(&stage, &paths, "/var/www/example/releases/20240101120000") {
            let removed = command
                .strip_prefix("rm -rf ")
                .and_then(|rest| rest.split(" && ").next())
                .unwrap();
            assert!(command.ends_with(removed), "link path differs from removed path: {}", command);
        }
    }
}

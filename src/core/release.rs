//! Release directory management: the on-disk layout on every target host,
//! release-label minting and fleet-side resolution, activation and rollback
//! of the `current` pointer.

use chrono::{DateTime, Utc};

use crate::context::{LayoutPaths, ReleaseContext, RunContext};
use crate::error::{Error, Result};
use crate::executor::{HostCommandResult, RemoteExecutor};
use crate::stage::{Host, Stage};
use crate::utils::shell;

// ============================================================================
// Release labels
// ============================================================================

/// Release labels are UTC timestamps, so newest sorts last.
pub fn release_label(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

pub fn is_release_label(s: &str) -> bool {
    s.len() == 14 && s.bytes().all(|b| b.is_ascii_digit())
}

pub fn mint(paths: &LayoutPaths) -> ReleaseContext {
    let id = release_label(Utc::now());
    let path = paths.release(&id);
    ReleaseContext { id, path }
}

// ============================================================================
// Fleet-side resolution
// ============================================================================

/// List staged releases on the first target host, oldest first.
pub fn list_releases(
    hosts: &[Host],
    paths: &LayoutPaths,
    executor: &dyn RemoteExecutor,
) -> Result<Vec<String>> {
    let host = first_host(hosts)?;
    let listing = executor.query(
        host,
        &format!("ls -1 {}", shell::quote_path(&paths.releases_root)),
    )?;
    let mut labels: Vec<String> = listing
        .into_iter()
        .filter(|name| is_release_label(name))
        .collect();
    labels.sort();
    Ok(labels)
}

/// The most recently staged release on the fleet.
pub fn resolve_latest(
    hosts: &[Host],
    paths: &LayoutPaths,
    executor: &dyn RemoteExecutor,
) -> Result<ReleaseContext> {
    let labels = list_releases(hosts, paths, executor)
        .map_err(|err| no_release_if_remote(err, paths))?;

    let id = labels
        .last()
        .cloned()
        .ok_or_else(|| Error::deploy_no_release(paths.deploy_to.clone()))?;
    let path = paths.release(&id);
    Ok(ReleaseContext { id, path })
}

/// The release the fleet would roll back to: the greatest label strictly
/// below the one `current` resolves to.
pub fn resolve_previous(
    hosts: &[Host],
    paths: &LayoutPaths,
    executor: &dyn RemoteExecutor,
) -> Result<ReleaseContext> {
    let host = first_host(hosts)?;
    let current_target = executor
        .query(
            host,
            &format!("readlink {}", shell::quote_path(&paths.current)),
        )
        .map_err(|err| no_release_if_remote(err, paths))?;
    let current_id = current_target
        .first()
        .and_then(|target| target.rsplit('/').next())
        .filter(|label| is_release_label(label))
        .map(|label| label.to_string())
        .ok_or_else(|| Error::deploy_no_release(paths.deploy_to.clone()))?;

    let labels = list_releases(hosts, paths, executor)?;
    let id = previous_release(&labels, &current_id)
        .ok_or_else(|| Error::deploy_no_previous_release(current_id))?;
    let path = paths.release(&id);
    Ok(ReleaseContext { id, path })
}

/// Greatest label strictly below `current_id`, if any.
pub fn previous_release(labels: &[String], current_id: &str) -> Option<String> {
    labels
        .iter()
        .filter(|label| label.as_str() < current_id)
        .max()
        .cloned()
}

fn first_host(hosts: &[Host]) -> Result<&Host> {
    hosts
        .first()
        .ok_or_else(|| Error::deploy_no_target_hosts("resolve_release", Vec::new()))
}

fn no_release_if_remote(err: Error, paths: &LayoutPaths) -> Error {
    if err.code == crate::ErrorCode::RemoteCommandFailed {
        Error::deploy_no_release(paths.deploy_to.clone())
    } else {
        err
    }
}

// ============================================================================
// Fleet setup
// ============================================================================

/// Commands provisioning one host, in order. Every command either creates a
/// missing directory or re-asserts ownership/permissions; none touches the
/// contents of an existing release.
pub fn setup_commands(stage: &Stage, paths: &LayoutPaths, user: &str) -> Vec<String> {
    let sudo = stage.try_sudo();
    let mut commands = vec![
        format!(
            "{}mkdir -p {} {}",
            sudo,
            shell::quote_path(&paths.releases_root),
            shell::quote_path(&paths.shared_root)
        ),
        format!(
            "{}chown -R {}:{} {}",
            sudo,
            shell::quote_arg(user),
            shell::quote_arg(&stage.runner_group),
            shell::quote_path(&paths.deploy_to)
        ),
    ];

    if !stage.shared_children.is_empty() {
        let children = stage
            .shared_children
            .iter()
            .map(|child| shell::quote_path(&paths.shared(child)))
            .collect::<Vec<_>>()
            .join(" ");
        commands.push(format!("{}mkdir -p {}", sudo, children));
    }

    commands.push(format!(
        "{}chown -R {}:{} {}",
        sudo,
        shell::quote_arg(user),
        shell::quote_arg(&stage.runner_group),
        shell::quote_path(&paths.shared_root)
    ));
    commands.push(format!(
        "{}chmod -R 2775 {}",
        sudo,
        shell::quote_path(&paths.shared_root)
    ));

    commands
}

/// Provision the release/shared layout on every target host. Commands run
/// per host because ownership is asserted for that host's login user.
pub fn run_setup(
    executor: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
) -> Result<Vec<HostCommandResult>> {
    let mut results = Vec::new();

    for host in hosts {
        log_status!("setup", "Provisioning {}", host.host);
        for command in setup_commands(&ctx.stage, &ctx.paths, &host.user) {
            let batch = executor.run(std::slice::from_ref(host), &command, true)?;
            let failed = batch.iter().any(|r| !r.success);
            results.extend(batch);
            if failed {
                return Ok(results);
            }
        }
    }

    Ok(results)
}

// ============================================================================
// Finalize, activate, rollback
// ============================================================================

/// Group-writability pass over the staged release. The fetch step may leave
/// files group-unwritable, which breaks later in-place asset writes.
pub fn run_finalize(
    executor: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
) -> Result<Vec<HostCommandResult>> {
    if !ctx.stage.group_writable {
        log_status!("deploy", "Skipping group-writability pass (disabled for stage)");
        return Ok(Vec::new());
    }

    let release_path = ctx.release_path()?;
    let command = format!("chmod -R g+w {}", shell::quote_path(release_path));
    executor.run(hosts, &command, true)
}

/// Repoint `current` without a window where it dangles: link under a
/// temporary name, then rename over the pointer.
pub fn activate_command(paths: &LayoutPaths, release_path: &str) -> String {
    let staged = format!("{}.new", paths.current);
    format!(
        "ln -nfs {} {} && mv -fT {} {}",
        shell::quote_path(release_path),
        shell::quote_path(&staged),
        shell::quote_path(&staged),
        shell::quote_path(&paths.current)
    )
}

pub fn run_activate(
    executor: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
) -> Result<Vec<HostCommandResult>> {
    let release_path = ctx.release_path()?;
    executor.run(hosts, &activate_command(&ctx.paths, release_path), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

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
    fn release_label_is_sortable_utc_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(release_label(at), "20240101120000");
        assert!(is_release_label("20240101120000"));
        assert!(!is_release_label("2024"));
        assert!(!is_release_label("2024010112000a"));
        assert!(!is_release_label("current"));
    }

    #[test]
    fn setup_commands_are_create_or_assert_only() {
        let stage = test_stage();
        let paths = LayoutPaths::for_deploy_root("/var/www/example");
        let commands = setup_commands(&stage, &paths, "deploy");

        assert_eq!(
            commands,
            vec![
                "mkdir -p '/var/www/example/releases' '/var/www/example/shared'",
                "chown -R deploy:www-data '/var/www/example'",
                "mkdir -p '/var/www/example/shared/files' '/var/www/example/shared/private'",
                "chown -R deploy:www-data '/var/www/example/shared'",
                "chmod -R 2775 '/var/www/example/shared'",
            ]
        );

        // Idempotence at the command level: a second run issues the exact
        // same create-if-missing/assert commands.
        assert_eq!(commands, setup_commands(&stage, &paths, "deploy"));
        assert!(commands
            .iter()
            .all(|c| c.starts_with("mkdir -p") || c.starts_with("chown") || c.starts_with("chmod")));
    }

    #[test]
    fn setup_commands_respect_sudo_flag() {
        let mut stage = test_stage();
        stage.use_sudo = true;
        let paths = LayoutPaths::for_deploy_root("/var/www/example");
        let commands = setup_commands(&stage, &paths, "deploy");
        assert!(commands.iter().all(|c| c.starts_with("sudo ")));
    }

    #[test]
    fn activate_links_then_renames_over_current() {
        let paths = LayoutPaths::for_deploy_root("/var/www/example");
        assert_eq!(
            activate_command(&paths, "/var/www/example/releases/20240101120000"),
            "ln -nfs '/var/www/example/releases/20240101120000' '/var/www/example/current.new' \
             && mv -fT '/var/www/example/current.new' '/var/www/example/current'"
        );
    }

    #[test]
    fn previous_release_picks_greatest_older_label() {
        let labels = vec![
            "20231201000000".to_string(),
            "20240101120000".to_string(),
            "20240201120000".to_string(),
        ];
        assert_eq!(
            previous_release(&labels, "20240201120000"),
            Some("20240101120000".to_string())
        );
        assert_eq!(previous_release(&labels, "20231201000000"), None);
    }
}

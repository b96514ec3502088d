//! Build & assembly: locate the build manifest inside the staged release,
//! materialize dependencies with the external build tool, then strip the
//! stock files the build always leaves behind.

use glob_match::glob_match;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::executor::{self, HostCommandResult, RemoteExecutor};
use crate::stage::Host;
use crate::utils::shell;

const MANIFEST_PATTERN: &str = "*.make";

/// Pick the single build manifest out of a release-root listing.
/// Zero or multiple matches is a configuration error; silently building an
/// arbitrary match could assemble the wrong artifact set.
pub fn select_manifest(release_path: &str, listing: &[String]) -> Result<String> {
    let matches: Vec<String> = listing
        .iter()
        .filter(|name| glob_match(MANIFEST_PATTERN, name))
        .cloned()
        .collect();

    match matches.len() {
        0 => Err(Error::deploy_manifest_missing(release_path, MANIFEST_PATTERN)),
        1 => Ok(matches.into_iter().next().unwrap_or_default()),
        _ => Err(Error::deploy_manifest_ambiguous(
            release_path,
            MANIFEST_PATTERN,
            matches,
        )),
    }
}

/// The build invocation run inside the release root.
pub fn make_command(site_tool_path: &str, make_args: &str, manifest: &str) -> String {
    let mut command = shell::quote_arg(site_tool_path);
    command.push_str(" make");
    if !make_args.trim().is_empty() {
        command.push(' ');
        command.push_str(make_args.trim());
    }
    command.push(' ');
    command.push_str(&shell::quote_arg(manifest));
    command.push_str(" .");
    command
}

/// Removal of the stock license/readme artifacts; `-f` keeps a re-run of a
/// partially-completed build step from failing on already-removed files.
pub fn strip_command(release_path: &str, core_files: &[String]) -> Option<String> {
    if core_files.is_empty() {
        return None;
    }
    let paths = core_files
        .iter()
        .map(|name| shell::quote_path(&format!("{}/{}", release_path, name)))
        .collect::<Vec<_>>()
        .join(" ");
    Some(format!("rm -f {}", paths))
}

/// Run the build step: discover the manifest with a read-only listing on
/// the first target host, reject ambiguity before anything destructive is
/// issued, then build on every host and strip the stock files.
pub fn run(
    executor_impl: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
) -> Result<Vec<HostCommandResult>> {
    let release_path = ctx.release_path()?;

    let host = hosts
        .first()
        .ok_or_else(|| Error::deploy_no_target_hosts("build", Vec::new()))?;
    let listing = executor_impl.query(
        host,
        &format!("ls -1 {}", shell::quote_path(release_path)),
    )?;
    let manifest = select_manifest(release_path, &listing)?;
    log_status!("build", "Building release from manifest {}", manifest);

    let build = executor::cd_and(
        release_path,
        &make_command(&ctx.stage.site_tool_path, &ctx.stage.make_args, &manifest),
    );
    let mut results = executor_impl.run(hosts, &build, true)?;
    if results.iter().any(|r| !r.success) {
        return Ok(results);
    }

    if let Some(strip) = strip_command(release_path, &ctx.stage.core_files_to_remove) {
        results.extend(executor_impl.run(hosts, &strip, true)?);
    }

    Ok(results)
}

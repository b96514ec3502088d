//! Cache and state invalidation: in-process opcode cache, application
//! cache, maintenance-mode toggling, and database migrations, all through
//! the external site command-line tool or the site's public URL.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::executor::{HostCommandResult, RemoteExecutor};
use crate::stage::Host;
use crate::utils::shell;

/// Script fetched once over the public URL to reset in-process caches.
const OPCACHE_CLEAR_SCRIPT: &str = "<?php\n\
    if (function_exists('opcache_reset')) {\n\
        opcache_reset();\n\
    }\n\
    if (function_exists('apcu_clear_cache')) {\n\
        apcu_clear_cache();\n\
    }\n\
    echo \"cleared\\n\";\n";

const OPCACHE_SCRIPT_NAME: &str = "opcache_clear.php";

/// Every site-tool invocation has the shape `{tool} -r {release} {args}`.
pub fn site_tool_command(site_tool_path: &str, release_path: &str, args: &str) -> String {
    format!(
        "{} -r {} {}",
        shell::quote_arg(site_tool_path),
        shell::quote_path(release_path),
        args
    )
}

pub fn cache_clear_command(site_tool_path: &str, release_path: &str) -> String {
    site_tool_command(site_tool_path, release_path, "cc all")
}

pub fn update_db_command(site_tool_path: &str, release_path: &str) -> String {
    site_tool_command(site_tool_path, release_path, "updatedb -y")
}

/// The two variable writes behind a maintenance-mode toggle. Plain
/// templated strings; no embedded stray syntax.
pub fn maintenance_commands(
    site_tool_path: &str,
    release_path: &str,
    offline: bool,
) -> Vec<String> {
    let flag = if offline { "1" } else { "0" };
    vec![
        site_tool_command(
            site_tool_path,
            release_path,
            &format!("vset site_offline {} -y", flag),
        ),
        site_tool_command(
            site_tool_path,
            release_path,
            &format!("vset maintenance_mode {} -y", flag),
        ),
    ]
}

pub fn opcache_script_path(release_path: &str) -> String {
    format!("{}/{}", release_path, OPCACHE_SCRIPT_NAME)
}

pub fn opcache_fetch_command(app_url: &str) -> String {
    format!(
        "curl -fsS {}",
        shell::quote_arg(&format!(
            "{}/{}",
            app_url.trim_end_matches('/'),
            OPCACHE_SCRIPT_NAME
        ))
    )
}

/// Clear the in-process opcode cache: drop the script into the release,
/// fetch it over the public URL, then optionally remove it.
pub fn run_opcache_clear(
    executor: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
) -> Result<Vec<HostCommandResult>> {
    let release_path = ctx.release_path()?;
    let app_url = ctx
        .stage
        .app_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| Error::config_missing_key("appUrl", None))?;

    let script_path = opcache_script_path(release_path);
    let mut results = executor.upload(hosts, OPCACHE_CLEAR_SCRIPT, &script_path)?;
    if results.iter().any(|r| !r.success) {
        return Ok(results);
    }

    results.extend(executor.run(hosts, &opcache_fetch_command(app_url), true)?);

    if ctx.stage.remove_opcache_script {
        let cleanup = format!("rm -f {}", shell::quote_path(&script_path));
        results.extend(executor.run(hosts, &cleanup, false)?);
    }

    Ok(results)
}

pub fn run_cache_clear(
    executor: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
) -> Result<Vec<HostCommandResult>> {
    let release_path = ctx.release_path()?;
    let command = cache_clear_command(&ctx.stage.site_tool_path, release_path);
    executor.run(hosts, &command, false)
}

pub fn run_update_db(
    executor: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
) -> Result<Vec<HostCommandResult>> {
    let release_path = ctx.release_path()?;
    let command = update_db_command(&ctx.stage.site_tool_path, release_path);
    executor.run(hosts, &command, true)
}

/// Both maintenance variables are written even if the first write fails;
/// the settings are independent.
pub fn run_maintenance(
    executor: &dyn RemoteExecutor,
    ctx: &RunContext,
    hosts: &[Host],
    offline: bool,
) -> Result<Vec<HostCommandResult>> {
    let release_path = ctx.release_path()?;
    let mut results = Vec::new();
    for command in maintenance_commands(&ctx.stage.site_tool_path, release_path, offline) {
        results.extend(executor.run(hosts, &command, false)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE: &str = "/var/www/example/releases/20240101120000";

    #[test]
    fn cache_clear_command_shape() {
        assert_eq!(
            cache_clear_command("drush", RELEASE),
            "drush -r '/var/www/example/releases/20240101120000' cc all"
        );
    }

    #[test]
    fn update_db_command_shape() {
        assert_eq!(
            update_db_command("drush", RELEASE),
            "drush -r '/var/www/example/releases/20240101120000' updatedb -y"
        );
    }

    #[test]
    fn maintenance_offline_commands_literal() {
        assert_eq!(
            maintenance_commands("drush", RELEASE, true),
            vec![
                "drush -r '/var/www/example/releases/20240101120000' vset site_offline 1 -y",
                "drush -r '/var/www/example/releases/20240101120000' vset maintenance_mode 1 -y",
            ]
        );
    }

    #[test]
    fn maintenance_online_commands_literal() {
        // Pins the exact strings: the variable writes differ from the
        // offline ones only in the flag value.
        assert_eq!(
            maintenance_commands("drush", RELEASE, false),
            vec![
                "drush -r '/var/www/example/releases/20240101120000' vset site_offline 0 -y",
                "drush -r '/var/www/example/releases/20240101120000' vset maintenance_mode 0 -y",
            ]
        );
    }

    #[test]
    fn maintenance_commands_contain_no_stray_braces() {
        for offline in [true, false] {
            for command in maintenance_commands("drush", RELEASE, offline) {
                assert!(!command.contains('}'), "stray brace in: {}", command);
                assert!(!command.contains('{'), "stray brace in: {}", command);
            }
        }
    }

    #[test]
    fn opcache_script_lands_in_the_release() {
        assert_eq!(
            opcache_script_path(RELEASE),
            "/var/www/example/releases/20240101120000/opcache_clear.php"
        );
    }

    #[test]
    fn opcache_fetch_hits_the_public_url() {
        assert_eq!(
            opcache_fetch_command("https://example.com/"),
            "curl -fsS https://example.com/opcache_clear.php"
        );
    }

    #[test]
    fn opcache_script_resets_both_caches() {
        assert!(OPCACHE_CLEAR_SCRIPT.contains("opcache_reset"));
        assert!(OPCACHE_CLEAR_SCRIPT.contains("apcu_clear_cache"));
        assert!(OPCACHE_CLEAR_SCRIPT.starts_with("<?php"));
    }
}

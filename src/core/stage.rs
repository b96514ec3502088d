use crate::config::{self, ConfigEntity};
use crate::error::{Error, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single target machine in a stage's fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub identity_file: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl Host {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && !self.user.is_empty()
    }
}

/// A named deployment environment: the fleet plus every deploy setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(skip_deserializing, default)]
    pub id: String,

    pub application: String,

    /// Public URL of the deployed site, used for opcode-cache invalidation.
    #[serde(default)]
    pub app_url: Option<String>,

    /// Deployment root on the target hosts. Defaults to /var/www/{application}.
    #[serde(default)]
    pub deploy_to: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Template for the opaque "fetch revision into release directory" step.
    /// Rendered with {{repository}}, {{branch}} and {{release_path}}.
    #[serde(default = "default_fetch_command")]
    pub fetch_command: String,

    /// Path to the external site command-line tool (cache/db operations).
    #[serde(default = "default_site_tool_path")]
    pub site_tool_path: String,

    /// Extra arguments passed through to the build tool.
    #[serde(default)]
    pub make_args: String,

    #[serde(default = "default_true")]
    pub group_writable: bool,

    #[serde(default)]
    pub use_sudo: bool,

    #[serde(default = "default_runner_group")]
    pub runner_group: String,

    /// Subdirectories created under shared/ at setup time.
    #[serde(default = "default_shared_children")]
    pub shared_children: Vec<String>,

    /// Release-relative directory the always-shared assets live under.
    #[serde(default = "default_shared_subroot")]
    pub shared_subroot: String,

    /// Assets replaced by symlinks under {release}/{sharedSubroot}/.
    #[serde(default = "default_always_shared_assets")]
    pub always_shared_assets: Vec<String>,

    /// Release-root files that frequently require local customization.
    #[serde(default = "default_override_assets")]
    pub override_assets: Vec<String>,

    /// Stock files stripped from a freshly built release root.
    #[serde(default = "default_core_files_to_remove")]
    pub core_files_to_remove: Vec<String>,

    /// Delete the opcode-clear script after fetching it.
    #[serde(default)]
    pub remove_opcache_script: bool,

    /// Per-task connection concurrency limit across the fleet.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    pub hosts: Vec<Host>,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_fetch_command() -> String {
    "git clone --depth 1 --branch {{branch}} {{repository}} {{release_path}}".to_string()
}

fn default_site_tool_path() -> String {
    "drush".to_string()
}

fn default_true() -> bool {
    true
}

fn default_runner_group() -> String {
    "www-data".to_string()
}

fn default_shared_children() -> Vec<String> {
    vec!["files".to_string(), "private".to_string()]
}

fn default_shared_subroot() -> String {
    "sites/default".to_string()
}

fn default_always_shared_assets() -> Vec<String> {
    vec![
        "files".to_string(),
        "private".to_string(),
        "settings.php".to_string(),
    ]
}

fn default_override_assets() -> Vec<String> {
    vec!["robots.txt".to_string(), ".htaccess".to_string()]
}

fn default_core_files_to_remove() -> Vec<String> {
    vec![
        "INSTALL.mysql.txt".to_string(),
        "INSTALL.pgsql.txt".to_string(),
        "CHANGELOG.txt".to_string(),
        "COPYRIGHT.txt".to_string(),
        "INSTALL.txt".to_string(),
        "LICENSE.txt".to_string(),
        "MAINTAINERS.txt".to_string(),
        "UPGRADE.txt".to_string(),
    ]
}

fn default_max_connections() -> usize {
    4
}

impl Stage {
    pub fn deploy_to(&self) -> String {
        match &self.deploy_to {
            Some(path) if !path.is_empty() => path.clone(),
            _ => format!("/var/www/{}", self.application),
        }
    }

    /// "sudo " prefix for setup commands when privilege escalation is enabled.
    pub fn try_sudo(&self) -> &'static str {
        if self.use_sudo {
            "sudo "
        } else {
            ""
        }
    }
}

impl ConfigEntity for Stage {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn config_path(id: &str) -> Result<PathBuf> {
        paths::stage(id)
    }
    fn config_dir() -> Result<PathBuf> {
        paths::stages()
    }
    fn not_found_error(id: String, suggestions: Vec<String>) -> Error {
        Error::stage_not_found(id, suggestions)
    }

    fn validate(&self) -> Result<()> {
        if self.application.is_empty() {
            return Err(Error::config_missing_key("application", None));
        }
        if self.hosts.is_empty() {
            return Err(Error::config_invalid_value(
                "hosts",
                None,
                "Stage must declare at least one host",
            ));
        }
        if let Some(invalid) = self.hosts.iter().find(|h| !h.is_valid()) {
            return Err(Error::config_invalid_value(
                "hosts",
                Some(invalid.host.clone()),
                "Every host needs a non-empty host and user",
            ));
        }
        if self.max_connections == 0 {
            return Err(Error::config_invalid_value(
                "maxConnections",
                Some("0".to_string()),
                "Connection concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Core CRUD - Thin wrappers around config module
// ============================================================================

pub fn load(id: &str) -> Result<Stage> {
    config::load::<Stage>(id)
}

pub fn list() -> Result<Vec<Stage>> {
    config::list::<Stage>()
}

pub fn list_ids() -> Result<Vec<String>> {
    config::list_ids::<Stage>()
}

pub fn save(stage: &Stage) -> Result<()> {
    config::save(stage)
}

pub fn delete(id: &str) -> Result<()> {
    config::delete::<Stage>(id)
}

pub fn exists(id: &str) -> bool {
    config::exists::<Stage>(id)
}

pub fn create(json_spec: &str) -> Result<Stage> {
    let raw = config::read_json_spec_to_string(json_spec)?;
    let value: serde_json::Value = config::from_str(&raw)?;

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::validation_invalid_argument("id", "Missing required field: id", None, None)
        })?
        .to_string();

    if exists(&id) {
        return Err(Error::validation_invalid_argument(
            "stage.id",
            format!("Stage '{}' already exists", id),
            Some(id),
            None,
        ));
    }

    let mut stage: Stage = serde_json::from_value(value)
        .map_err(|e| Error::validation_invalid_argument("json", e.to_string(), None, None))?;
    stage.set_id(id);
    save(&stage)?;
    Ok(stage)
}

pub fn merge(id: &str, json_spec: &str) -> Result<(Stage, Vec<String>)> {
    let updated_fields = config::merge::<Stage>(id, json_spec)?;
    Ok((load(id)?, updated_fields))
}

use crate::error::{Error, Result};
use crate::executor::RemoteExecutor;
use crate::release;
use crate::stage::{Host, Stage};

/// The remote file layout contract for one stage:
/// `{deployTo}/releases/{label}`, `{deployTo}/shared/{child}`, and a
/// `current` symlink always resolving to exactly one release.
#[derive(Debug, Clone)]
pub struct LayoutPaths {
    pub deploy_to: String,
    pub releases_root: String,
    pub shared_root: String,
    pub current: String,
}

impl LayoutPaths {
    pub fn for_deploy_root(deploy_to: &str) -> Self {
        let deploy_to = deploy_to.trim_end_matches('/').to_string();
        Self {
            releases_root: format!("{}/releases", deploy_to),
            shared_root: format!("{}/shared", deploy_to),
            current: format!("{}/current", deploy_to),
            deploy_to,
        }
    }

    pub fn release(&self, id: &str) -> String {
        format!("{}/{}", self.releases_root, id)
    }

    pub fn shared(&self, name: &str) -> String {
        format!("{}/{}", self.shared_root, name)
    }
}

#[derive(Debug, Clone)]
pub struct ReleaseContext {
    pub id: String,
    pub path: String,
}

/// How a pipeline run obtains its release context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// No release context (fleet bootstrap).
    None,
    /// Mint a fresh timestamp label for a new deploy.
    Mint,
    /// Resolve the most recently staged release from the fleet.
    Latest,
    /// Resolve the release the fleet would roll back to.
    Previous,
}

/// Everything a pipeline run needs, resolved once up front and passed by
/// reference to every task. No task reads ambient process-wide state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub stage_id: String,
    pub stage: Stage,
    /// Fleet narrowed by any operator `--host` override.
    pub hosts: Vec<Host>,
    pub paths: LayoutPaths,
    pub release: Option<ReleaseContext>,
}

impl RunContext {
    pub fn build(
        stage_id: &str,
        stage: Stage,
        host_override: &[String],
        mode: ReleaseMode,
        executor: &dyn RemoteExecutor,
    ) -> Result<Self> {
        let hosts = resolve_hosts(&stage, host_override)?;
        let paths = LayoutPaths::for_deploy_root(&stage.deploy_to());

        let release = match mode {
            ReleaseMode::None => None,
            ReleaseMode::Mint => Some(release::mint(&paths)),
            ReleaseMode::Latest => Some(release::resolve_latest(&hosts, &paths, executor)?),
            ReleaseMode::Previous => Some(release::resolve_previous(&hosts, &paths, executor)?),
        };

        if let Some(release) = &release {
            log_status!("context", "Release for this run: {}", release.id);
        }

        Ok(Self {
            stage_id: stage_id.to_string(),
            stage,
            hosts,
            paths,
            release,
        })
    }

    /// The release path, for tasks that declared they need one.
    pub fn release_path(&self) -> Result<&str> {
        self.release
            .as_ref()
            .map(|r| r.path.as_str())
            .ok_or_else(|| Error::deploy_no_release(self.stage_id.clone()))
    }
}

fn resolve_hosts(stage: &Stage, host_override: &[String]) -> Result<Vec<Host>> {
    if host_override.is_empty() {
        return Ok(stage.hosts.clone());
    }

    let unknown: Vec<String> = host_override
        .iter()
        .filter(|name| !stage.hosts.iter().any(|h| &h.host == *name))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(Error::validation_invalid_argument(
            "host",
            "Host override names hosts not present in the stage",
            None,
            Some(unknown),
        ));
    }

    Ok(stage
        .hosts
        .iter()
        .filter(|h| host_override.iter().any(|name| name == &h.host))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stage() -> Stage {
        serde_json::from_str(
            r#"{
                "application": "example",
                "hosts": [
                    {"host": "web1", "user": "deploy", "roles": ["web"]},
                    {"host": "web2", "user": "deploy", "roles": ["web"]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn layout_paths_follow_the_contract() {
        let paths = LayoutPaths::for_deploy_root("/var/www/example/");
        assert_eq!(paths.deploy_to, "/var/www/example");
        assert_eq!(paths.releases_root, "/var/www/example/releases");
        assert_eq!(paths.shared_root, "/var/www/example/shared");
        assert_eq!(paths.current, "/var/www/example/current");
        assert_eq!(
            paths.release("20240101120000"),
            "/var/www/example/releases/20240101120000"
        );
        assert_eq!(paths.shared("files"), "/var/www/example/shared/files");
    }

    #[test]
    fn host_override_narrows_fleet() {
        let stage = test_stage();
        let hosts = resolve_hosts(&stage, &["web2".to_string()]).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].host, "web2");
    }

    #[test]
    fn empty_override_keeps_full_fleet() {
        let stage = test_stage();
        let hosts = resolve_hosts(&stage, &[]).unwrap();
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn unknown_host_override_is_rejected() {
        let stage = test_stage();
        let err = resolve_hosts(&stage, &["web9".to_string()]).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    StageNotFound,

    SshIdentityFileNotFound,
    SshAuthFailed,
    SshConnectFailed,

    RemoteCommandFailed,

    DeployNoRelease,
    DeployNoPreviousRelease,
    DeployManifestMissing,
    DeployManifestAmbiguous,
    DeployNoTargetHosts,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::StageNotFound => "stage.not_found",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::SshAuthFailed => "ssh.auth_failed",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",

            ErrorCode::DeployNoRelease => "deploy.no_release",
            ErrorCode::DeployNoPreviousRelease => "deploy.no_previous_release",
            ErrorCode::DeployManifestMissing => "deploy.manifest_missing",
            ErrorCode::DeployManifestAmbiguous => "deploy.manifest_ambiguous",
            ErrorCode::DeployNoTargetHosts => "deploy.no_target_hosts",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Whether the error is a configuration-class failure that must abort
    /// before any remote host is touched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigMissingKey
                | ErrorCode::ConfigInvalidJson
                | ErrorCode::ConfigInvalidValue
                | ErrorCode::ValidationMissingArgument
                | ErrorCode::ValidationInvalidArgument
                | ErrorCode::ValidationInvalidJson
                | ErrorCode::StageNotFound
                | ErrorCode::DeployNoRelease
                | ErrorCode::DeployNoPreviousRelease
                | ErrorCode::DeployManifestMissing
                | ErrorCode::DeployManifestAmbiguous
                | ErrorCode::DeployNoTargetHosts
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub target: TargetDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshIdentityFileNotFoundDetails {
    pub host: String,
    pub identity_file: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshFailureDetails {
    pub host: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDetails {
    pub release_path: String,
    pub pattern: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem: problem.into(),
                id,
                tried,
            }),
        )
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidJson,
            "Invalid JSON",
            serde_json::json!({ "error": err.to_string(), "context": context }),
        )
    }

    pub fn stage_not_found(id: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::new(
            ErrorCode::StageNotFound,
            "Stage not found",
            to_details(NotFoundDetails {
                id: id.into(),
                suggestions,
            }),
        )
        .with_hint("Run 'stagehand stage list' to see available stages")
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            to_details(ConfigMissingKeyDetails {
                key: key.into(),
                path,
            }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn ssh_identity_file_not_found(
        host: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            to_details(SshIdentityFileNotFoundDetails {
                host: host.into(),
                identity_file: identity_file.into(),
            }),
        )
    }

    pub fn ssh_auth_failed(host: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::SshAuthFailed,
            "SSH authentication failed",
            to_details(SshFailureDetails {
                host: host.into(),
                stderr: stderr.into(),
            }),
        )
    }

    pub fn ssh_connect_failed(host: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::SshConnectFailed,
            "SSH connection failed",
            to_details(SshFailureDetails {
                host: host.into(),
                stderr: stderr.into(),
            }),
        )
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        Self::new(
            ErrorCode::RemoteCommandFailed,
            "Remote command failed",
            to_details(details),
        )
    }

    pub fn deploy_no_release(stage_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeployNoRelease,
            "No resolvable release for this stage",
            serde_json::json!({ "stageId": stage_id.into() }),
        )
        .with_hint("Run 'stagehand deploy <stage>' to stage a release first")
    }

    pub fn deploy_no_previous_release(current: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeployNoPreviousRelease,
            "No release older than the current one to roll back to",
            serde_json::json!({ "current": current.into() }),
        )
    }

    pub fn deploy_manifest_missing(release_path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeployManifestMissing,
            "No build manifest found in release root",
            to_details(ManifestDetails {
                release_path: release_path.into(),
                pattern: pattern.into(),
                matches: Vec::new(),
            }),
        )
    }

    pub fn deploy_manifest_ambiguous(
        release_path: impl Into<String>,
        pattern: impl Into<String>,
        matches: Vec<String>,
    ) -> Self {
        Self::new(
            ErrorCode::DeployManifestAmbiguous,
            "Multiple build manifests found in release root",
            to_details(ManifestDetails {
                release_path: release_path.into(),
                pattern: pattern.into(),
                matches,
            }),
        )
        .with_hint("Keep exactly one .make manifest in the repository root")
    }

    pub fn deploy_no_target_hosts(task: impl Into<String>, roles: Vec<String>) -> Self {
        Self::new(
            ErrorCode::DeployNoTargetHosts,
            "Task resolved to an empty target host set",
            serde_json::json!({ "task": task.into(), "roles": roles }),
        )
        .with_hint("Check the stage's host role assignments and any --host override")
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    /// Message plus the error code, for inline reporting.
    pub fn message_with_details(&self) -> String {
        format!("{} ({})", self.message, self.code.as_str())
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

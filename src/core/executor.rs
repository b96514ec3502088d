use serde::Serialize;
use std::thread;

use crate::error::{Error, RemoteCommandFailedDetails, Result, TargetDetails};
use crate::ssh::{self, SshClient};
use crate::stage::Host;
use crate::utils::shell;

/// Outcome of one command on one host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostCommandResult {
    pub host: String,
    pub command: String,
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Executes remote operations against a set of target hosts.
///
/// `run` and `upload` report per-host outcomes; non-zero exits surface in
/// the results and are judged by the caller's error policy. Connection and
/// authentication failures are fatal and returned as errors. `query` is the
/// read-only discovery half of the query-then-command pattern: it lists
/// without mutating, so steps can validate before issuing anything
/// destructive.
pub trait RemoteExecutor: Send + Sync {
    fn run(
        &self,
        hosts: &[Host],
        command: &str,
        stop_on_failure: bool,
    ) -> Result<Vec<HostCommandResult>>;

    fn query(&self, host: &Host, command: &str) -> Result<Vec<String>>;

    fn upload(
        &self,
        hosts: &[Host],
        content: &str,
        remote_path: &str,
    ) -> Result<Vec<HostCommandResult>>;
}

/// Production executor: one SSH connection per host, parallel within a
/// bounded batch.
pub struct SshExecutor {
    max_connections: usize,
}

impl SshExecutor {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections: max_connections.max(1),
        }
    }

    fn dispatch<F>(
        &self,
        hosts: &[Host],
        stop_on_failure: bool,
        label: &str,
        op: F,
    ) -> Result<Vec<HostCommandResult>>
    where
        F: Fn(&SshClient) -> ssh::CommandOutput + Send + Sync + Clone + 'static,
    {
        let mut results = Vec::with_capacity(hosts.len());

        for batch in hosts.chunks(self.max_connections) {
            if batch.len() == 1 {
                let host = &batch[0];
                let client = SshClient::from_host(host)?;
                results.push(classify(host, label, op(&client))?);
            } else {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|host| {
                        let host = host.clone();
                        let op = op.clone();
                        let label = label.to_string();
                        thread::spawn(move || {
                            let client = SshClient::from_host(&host)?;
                            classify(&host, &label, op(&client))
                        })
                    })
                    .collect();

                for handle in handles {
                    let result = handle.join().map_err(|_| {
                        Error::internal_unexpected("Remote execution thread panicked".to_string())
                    })??;
                    results.push(result);
                }
            }

            // Best-effort cancellation: a failed batch stops later batches
            // from being dispatched; in-flight commands are not killed.
            if stop_on_failure && results.iter().any(|r| !r.success) {
                break;
            }
        }

        Ok(results)
    }
}

impl RemoteExecutor for SshExecutor {
    fn run(
        &self,
        hosts: &[Host],
        command: &str,
        stop_on_failure: bool,
    ) -> Result<Vec<HostCommandResult>> {
        let cmd = command.to_string();
        self.dispatch(hosts, stop_on_failure, command, move |client| {
            client.execute(&cmd)
        })
    }

    fn query(&self, host: &Host, command: &str) -> Result<Vec<String>> {
        let client = SshClient::from_host(host)?;
        let result = classify(host, command, client.execute(command))?;

        if !result.success {
            return Err(Error::remote_command_failed(RemoteCommandFailedDetails {
                command: command.to_string(),
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
                target: TargetDetails {
                    stage_id: None,
                    task: None,
                    host: Some(host.host.clone()),
                },
            }));
        }

        Ok(result
            .stdout
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    fn upload(
        &self,
        hosts: &[Host],
        content: &str,
        remote_path: &str,
    ) -> Result<Vec<HostCommandResult>> {
        let label = format!("upload {}", remote_path);
        let content = content.to_string();
        let remote_path = remote_path.to_string();
        self.dispatch(hosts, true, &label, move |client| {
            client.upload_content(&content, &remote_path)
        })
    }
}

/// Split a raw command outcome into fatal transport errors vs per-host
/// command results. Authentication and connection failures abort the run
/// regardless of task policy.
fn classify(host: &Host, command: &str, output: ssh::CommandOutput) -> Result<HostCommandResult> {
    if !output.success && !host_is_local(host) {
        if ssh::is_auth_ssh_error(&output) {
            return Err(Error::ssh_auth_failed(host.host.clone(), output.stderr));
        }
        if ssh::is_transient_ssh_error(&output) {
            return Err(Error::ssh_connect_failed(host.host.clone(), output.stderr));
        }
    }

    Ok(HostCommandResult {
        host: host.host.clone(),
        command: command.to_string(),
        success: output.success,
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

fn host_is_local(host: &Host) -> bool {
    ssh::is_local_host(&host.host)
}

/// Build a `cd <dir> && <command>` string with the directory quoted.
pub fn cd_and(dir: &str, command: &str) -> String {
    format!("cd {} && {}", shell::quote_path(dir), command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_host() -> Host {
        Host {
            host: "localhost".to_string(),
            user: "deploy".to_string(),
            port: 22,
            roles: vec!["web".to_string()],
            identity_file: None,
        }
    }

    #[test]
    fn run_collects_local_results() {
        let executor = SshExecutor::new(2);
        let results = executor.run(&[local_host()], "echo ok", true).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].stdout.trim(), "ok");
    }

    #[test]
    fn run_reports_nonzero_exit_as_result_not_error() {
        let executor = SshExecutor::new(2);
        let results = executor.run(&[local_host()], "exit 7", true).unwrap();
        assert!(!results[0].success);
        assert_eq!(results[0].exit_code, 7);
    }

    #[test]
    fn query_returns_trimmed_lines() {
        let executor = SshExecutor::new(1);
        let lines = executor
            .query(&local_host(), "printf 'a\\n\\nb\\n'")
            .unwrap();
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn query_failure_is_remote_command_error() {
        let executor = SshExecutor::new(1);
        let err = executor.query(&local_host(), "exit 2").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::RemoteCommandFailed);
    }

    #[test]
    fn stop_on_failure_skips_later_batches() {
        // Two batches of one host each; the first fails, so only one result.
        let executor = SshExecutor::new(1);
        let hosts = vec![local_host(), local_host()];
        let results = executor.run(&hosts, "exit 1", true).unwrap();
        assert_eq!(results.len(), 1);

        let results = executor.run(&hosts, "exit 1", false).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn cd_and_quotes_directory() {
        assert_eq!(
            cd_and("/var/www/app", "ls"),
            "cd '/var/www/app' && ls"
        );
    }
}

use crate::error::{Error, Result};
use crate::stage::Host;
use crate::utils::shell;
use std::io::Write;
use std::process::{Command, Stdio};

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl SshClient {
    pub fn from_host(host: &Host) -> Result<Self> {
        let identity_file = match &host.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(host.host.clone(), expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&host.host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost — using local execution", host.host);
        }

        Ok(Self {
            host: host.host.clone(),
            user: host.user.clone(),
            port: host.port,
            identity_file,
            is_local,
        })
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Add timeout and keepalive options to prevent hangs on stalled
        // connections or unexpected prompts.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command, None, 3)
    }

    /// Write inline content to a remote path (`cat > path` with piped stdin).
    pub fn upload_content(&self, content: &str, remote_path: &str) -> CommandOutput {
        let remote_command = format!("cat > {}", shell::quote_path(remote_path));
        self.execute_with_retry(&remote_command, Some(content), 3)
    }

    fn execute_with_retry(
        &self,
        command: &str,
        stdin_content: Option<&str>,
        max_attempts: u32,
    ) -> CommandOutput {
        let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3

        for attempt in 0..max_attempts {
            let result = self.execute_once(command, stdin_content);

            // Only retry on transient connection errors, not command failures
            // or authentication rejections.
            if result.success
                || attempt + 1 >= max_attempts
                || is_auth_ssh_error(&result)
                || !is_transient_ssh_error(&result)
            {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize + 1).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection failed (attempt {}/{}), retrying in {}s...",
                attempt + 1,
                max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
        }

        // Unreachable, but satisfy the compiler
        CommandOutput {
            stdout: String::new(),
            stderr: "SSH retry exhausted".to_string(),
            success: false,
            exit_code: -1,
        }
    }

    fn execute_once(&self, command: &str, stdin_content: Option<&str>) -> CommandOutput {
        // Local execution: run command directly instead of over SSH
        if self.is_local {
            return execute_local_command_with_stdin(command, stdin_content);
        }

        let args = self.build_ssh_args(command);

        let mut cmd = Command::new("ssh");
        cmd.args(&args);

        if stdin_content.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandOutput {
                    stdout: String::new(),
                    stderr: format!("SSH error: {}", e),
                    success: false,
                    exit_code: -1,
                }
            }
        };

        if let Some(content) = stdin_content {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(content.as_bytes()) {
                    let _ = child.kill();
                    return CommandOutput {
                        stdout: String::new(),
                        stderr: format!("Failed to write stdin: {}", e),
                        success: false,
                        exit_code: -1,
                    };
                }
            }
        }

        match child.wait_with_output() {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput {
                stdout: String::new(),
                stderr: format!("SSH error: {}", e),
                success: false,
                exit_code: -1,
            },
        }
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    execute_local_command_with_stdin(command, None)
}

fn execute_local_command_with_stdin(command: &str, stdin_content: Option<&str>) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if stdin_content.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return CommandOutput {
                stdout: String::new(),
                stderr: format!("Command error: {}", e),
                success: false,
                exit_code: -1,
            }
        }
    };

    if let Some(content) = stdin_content {
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(content.as_bytes()) {
                let _ = child.kill();
                return CommandOutput {
                    stdout: String::new(),
                    stderr: format!("Failed to write stdin: {}", e),
                    success: false,
                    exit_code: -1,
                };
            }
        }
    }

    match child.wait_with_output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput {
            stdout: String::new(),
            stderr: format!("Command error: {}", e),
            success: false,
            exit_code: -1,
        },
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
pub(crate) fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve hostname",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}

/// Check if an SSH failure looks like an authentication rejection.
pub(crate) fn is_auth_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    output.exit_code == 255
        && (stderr.contains("permission denied")
            || stderr.contains("authentication failed")
            || stderr.contains("host key verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_host_detection() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("::1"));
        assert!(!is_local_host("web1.example.com"));
    }

    #[test]
    fn local_command_captures_output() {
        let output = execute_local_command("echo staged");
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "staged");
    }

    #[test]
    fn local_command_reports_exit_code() {
        let output = execute_local_command("exit 3");
        assert!(!output.success);
        assert_eq!(output.exit_code, 3);
    }

    #[test]
    fn transient_error_detection() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "ssh: connect to host web1: Connection refused".to_string(),
            success: false,
            exit_code: 255,
        };
        assert!(is_transient_ssh_error(&output));

        let command_failure = CommandOutput {
            stdout: String::new(),
            stderr: "rm: cannot remove".to_string(),
            success: false,
            exit_code: 1,
        };
        assert!(!is_transient_ssh_error(&command_failure));
    }

    #[test]
    fn auth_error_detection() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "deploy@web1: Permission denied (publickey).".to_string(),
            success: false,
            exit_code: 255,
        };
        assert!(is_auth_ssh_error(&output));
    }
}

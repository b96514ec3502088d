mod client;

pub use client::{execute_local_command, is_local_host, CommandOutput, SshClient};
pub(crate) use client::{is_auth_ssh_error, is_transient_ssh_error};

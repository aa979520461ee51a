//! Executor backed by the system `ssh` binary. A server whose host names
//! the local machine runs commands through `sh -c` instead.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::executor::{CommandOutput, Executor};
use crate::server::Server;

/// Attempts per command when the connection itself fails.
const MAX_ATTEMPTS: usize = 3;
/// Pause before the second and third attempt.
const RETRY_DELAYS: [u64; 2] = [2, 5];

/// `-o` options for unattended sessions: no prompts, no hanging on a dead link.
const BATCH_OPTIONS: [&str; 4] = [
    "BatchMode=yes",
    "ConnectTimeout=10",
    "ServerAliveInterval=15",
    "ServerAliveCountMax=3",
];

/// stderr fragments that mean the connection failed, not the command.
const CONNECTION_ERRORS: [&str; 10] = [
    "connection refused",
    "connection reset",
    "connection timed out",
    "connection closed by remote host",
    "no route to host",
    "network is unreachable",
    "could not resolve hostname",
    "temporary failure in name resolution",
    "ssh_exchange_identification",
    "broken pipe",
];

/// ssh exits 255 when it could not run the remote command at all.
const SSH_CONNECTION_EXIT: i32 = 255;

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    local: bool,
}

impl SshClient {
    pub fn from_server(server: &Server, server_id: &str) -> Result<Self> {
        let missing = server.missing_fields();
        if !missing.is_empty() {
            return Err(Error::ssh_server_invalid(server_id, missing));
        }

        let identity_file = match server.identity_file.as_deref() {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).into_owned();
                if !Path::new(&expanded).is_file() {
                    return Err(Error::ssh_identity_file_not_found(server_id, expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        let local = is_local_host(&server.host);
        if local {
            log_status!("ssh", "'{}' points at this machine; running commands locally", server_id);
        }

        Ok(Self {
            host: server.host.clone(),
            user: server.user.clone(),
            port: server.port,
            identity_file,
            local,
        })
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    fn ssh_args(&self, remote_command: Option<&str>, interactive: bool) -> Vec<String> {
        let mut args = Vec::new();

        if interactive {
            args.push("-t".to_string());
        } else {
            for option in BATCH_OPTIONS {
                args.push("-o".to_string());
                args.push(option.to_string());
            }
        }
        if let Some(key) = &self.identity_file {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        args.push(self.target());
        args.extend(remote_command.map(str::to_string));
        args
    }

    fn command_for(&self, line: &str) -> Command {
        if self.local {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        } else {
            let mut cmd = Command::new("ssh");
            cmd.args(self.ssh_args(Some(line), false));
            cmd
        }
    }

    fn execute_once(&self, line: &str, stdin_file: Option<&Path>) -> CommandOutput {
        let mut cmd = self.command_for(line);

        match stdin_file.map(File::open) {
            Some(Ok(file)) => {
                cmd.stdin(file);
            }
            Some(Err(err)) => {
                return CommandOutput::failure(-1, format!("Cannot open stdin file: {}", err));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        capture(&mut cmd)
    }

    fn execute_retrying(&self, line: &str, stdin_file: Option<&Path>) -> CommandOutput {
        let mut attempt = 1;
        loop {
            let output = self.execute_once(line, stdin_file);
            if output.success || attempt == MAX_ATTEMPTS || self.local || !is_connection_failure(&output) {
                return output;
            }

            let delay = RETRY_DELAYS[attempt - 1];
            log_status!(
                "ssh",
                "{} unreachable (attempt {}/{}), retrying in {}s",
                self.host,
                attempt,
                MAX_ATTEMPTS,
                delay
            );
            thread::sleep(Duration::from_secs(delay));
            attempt += 1;
        }
    }

    /// Hand the terminal to a remote login shell or a single command. Returns its exit code.
    pub fn execute_interactive(&self, command: Option<&str>) -> i32 {
        let mut cmd = if self.local {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command.unwrap_or("exec \"${SHELL:-sh}\" -l"));
            cmd
        } else {
            let mut cmd = Command::new("ssh");
            cmd.args(self.ssh_args(command, true));
            cmd
        };

        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .ok()
            .and_then(|status| status.code())
            .unwrap_or(-1)
    }
}

impl Executor for SshClient {
    fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn execute(&self, command: &str) -> CommandOutput {
        self.execute_retrying(command, None)
    }

    fn execute_with_stdin(&self, command: &str, stdin_file: &Path) -> CommandOutput {
        self.execute_retrying(command, Some(stdin_file))
    }
}

fn capture(cmd: &mut Command) -> CommandOutput {
    match cmd.output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(err) => CommandOutput::failure(-1, format!("Cannot start {:?}: {}", cmd.get_program(), err)),
    }
}

pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

fn is_connection_failure(output: &CommandOutput) -> bool {
    if output.exit_code == SSH_CONNECTION_EXIT {
        return true;
    }
    let stderr = output.stderr.to_lowercase();
    CONNECTION_ERRORS.iter().any(|fragment| stderr.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(port: u16, identity_file: Option<&str>) -> SshClient {
        SshClient {
            host: "web1.example.com".to_string(),
            user: "deploy".to_string(),
            port,
            identity_file: identity_file.map(String::from),
            local: false,
        }
    }

    fn server(host: &str, identity_file: Option<&str>) -> Server {
        Server {
            id: "web1".to_string(),
            host: host.to_string(),
            user: "deploy".to_string(),
            port: 22,
            identity_file: identity_file.map(String::from),
        }
    }

    #[test]
    fn batch_session_sets_options_then_target_and_command() {
        let args = remote(22, None).ssh_args(Some("uptime"), false);
        assert_eq!(args[..2], ["-o", "BatchMode=yes"]);
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(!args.contains(&"-p".to_string()));
        assert_eq!(args[args.len() - 2..], ["deploy@web1.example.com", "uptime"]);
    }

    #[test]
    fn interactive_session_allocates_tty_with_key_and_port() {
        let args = remote(2222, Some("/keys/id_rsa")).ssh_args(None, true);
        assert_eq!(
            args,
            ["-t", "-i", "/keys/id_rsa", "-p", "2222", "deploy@web1.example.com"]
        );
    }

    #[test]
    fn connection_failures_are_told_apart_from_command_failures() {
        assert!(is_connection_failure(&CommandOutput::failure(255, "")));
        assert!(is_connection_failure(&CommandOutput::failure(
            1,
            "ssh: connect to host web1 port 22: Connection refused"
        )));
        assert!(!is_connection_failure(&CommandOutput::failure(
            2,
            "tar: Error is not recoverable"
        )));
    }

    #[test]
    fn from_server_requires_host_and_user() {
        let err = SshClient::from_server(&server("", None), "web1").err().unwrap();
        assert_eq!(err.code, crate::ErrorCode::SshServerInvalid);
    }

    #[test]
    fn from_server_rejects_missing_identity_file() {
        let err = SshClient::from_server(&server("web1", Some("/nonexistent/deckhand/key")), "web1")
            .err()
            .unwrap();
        assert_eq!(err.code, crate::ErrorCode::SshIdentityFileNotFound);
    }

    #[test]
    fn localhost_runs_through_sh() {
        let client = SshClient::from_server(&server("localhost", None), "local").unwrap();
        assert!(client.is_local());
        let output = client.execute("echo hi");
        assert!(output.success);
        assert_eq!(output.stdout_trimmed(), "hi");
    }

    #[test]
    fn local_stdin_comes_from_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        std::fs::write(&path, "release bytes").unwrap();

        let client = SshClient::from_server(&server("127.0.0.1", None), "local").unwrap();
        let output = client.execute_with_stdin("cat", &path);
        assert_eq!(output.stdout, "release bytes");
    }
}

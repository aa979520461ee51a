//! Command execution seam between remote operations and the transport.
//!
//! Operations build [`ShellCommand`]s and hand them to an [`Executor`]. The SSH client
//! implements it for real hosts; tests substitute a recorder.

use std::path::Path;

use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::utils::shell::ShellCommand;

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Non-empty stdout lines, trimmed.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }
}

pub trait Executor {
    /// Label of the host commands run on (`user@host`).
    fn target(&self) -> String;

    fn execute(&self, command: &str) -> CommandOutput;

    /// Execute with the contents of a local file on stdin.
    fn execute_with_stdin(&self, command: &str, stdin_file: &Path) -> CommandOutput;

    /// Run a command; non-zero exit is a `remote.command_failed` error.
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        let line = command.render()?;
        let output = self.execute(&line);
        require_success(&self.target(), &line, output)
    }

    /// Run a command whose failure is an answer, not an error (probes, `status`).
    fn run_unchecked(&self, command: &ShellCommand) -> Result<CommandOutput> {
        let line = command.render()?;
        Ok(self.execute(&line))
    }

    fn succeeds(&self, command: &ShellCommand) -> Result<bool> {
        Ok(self.run_unchecked(command)?.success)
    }

    /// Stream a local file to `remote_path`. With `sudo` the file is written as root via `tee`.
    fn upload(&self, local_path: &Path, remote_path: &str, sudo: bool) -> Result<()> {
        if !local_path.is_file() {
            return Err(Error::resource_not_found(local_path.display().to_string()));
        }

        let command = if sudo {
            ShellCommand::sudo("tee")
                .arg(remote_path)
                .stdout_to("/dev/null")
        } else {
            ShellCommand::new("cat").stdout_to(remote_path)
        };

        let line = command.render()?;
        let output = self.execute_with_stdin(&line, local_path);
        require_success(&self.target(), &line, output).map(|_| ())
    }
}

pub(crate) fn require_success(target: &str, line: &str, output: CommandOutput) -> Result<CommandOutput> {
    if output.success {
        return Ok(output);
    }

    Err(Error::remote_command_failed(RemoteCommandFailedDetails {
        command: line.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        target: target.to_string(),
    }))
}

/// Scratch directory on the target, removed with `rm -rf` when dropped.
pub struct RemoteTempDir<'a> {
    exec: &'a dyn Executor,
    path: String,
    sudo_cleanup: bool,
}

impl<'a> RemoteTempDir<'a> {
    pub fn create(exec: &'a dyn Executor) -> Result<Self> {
        let output = exec.run(&ShellCommand::new("mktemp").args(["-d", "-t", "deckhand.XXXXXXXX"]))?;
        let path = output.stdout_trimmed().to_string();

        if path.is_empty() || !path.starts_with('/') {
            return Err(Error::internal_unexpected(format!(
                "mktemp on {} returned an unusable path: {:?}",
                exec.target(),
                path
            )));
        }

        Ok(Self {
            exec,
            path,
            sudo_cleanup: false,
        })
    }

    /// Remove with sudo, for directories where root-owned files get created.
    pub fn with_sudo_cleanup(mut self) -> Self {
        self.sudo_cleanup = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn join(&self, name: &str) -> String {
        format!("{}/{}", self.path, name)
    }
}

impl Drop for RemoteTempDir<'_> {
    fn drop(&mut self) {
        let command = ShellCommand::new("rm")
            .elevated(self.sudo_cleanup)
            .args(["-rf", &self.path]);

        if let Ok(output) = self.exec.run_unchecked(&command) {
            if !output.success {
                log_status!(
                    "ssh",
                    "Could not remove temporary directory {} on {}: {}",
                    self.path,
                    self.exec.target(),
                    output.stderr.trim()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    #[test]
    fn run_maps_non_zero_exit_to_remote_failure() {
        let exec = RecordingExecutor::new();
        exec.respond("false", CommandOutput::failure(3, "boom"));

        let err = exec.run(&ShellCommand::new("false")).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::RemoteCommandFailed);
        assert_eq!(err.details["exitCode"], 3);
        assert_eq!(err.details["stderr"], "boom");
        assert_eq!(err.details["target"], "deploy@test-host");
    }

    #[test]
    fn run_unchecked_returns_failed_output() {
        let exec = RecordingExecutor::new();
        exec.respond("status nginx", CommandOutput::failure(1, "unknown job"));

        let output = exec
            .run_unchecked(&ShellCommand::sudo("status").arg("nginx"))
            .unwrap();
        assert!(!output.success);
    }

    #[test]
    fn upload_uses_tee_for_root_owned_targets() {
        let exec = RecordingExecutor::new();
        let file = tempfile::NamedTempFile::new().unwrap();

        exec.upload(file.path(), "/etc/init/nginx.conf", true)
            .unwrap();
        exec.upload(file.path(), "/tmp/x", false).unwrap();

        assert_eq!(
            exec.commands(),
            vec![
                "sudo tee /etc/init/nginx.conf > '/dev/null'".to_string(),
                "cat > '/tmp/x'".to_string(),
            ]
        );
    }

    #[test]
    fn upload_requires_local_file() {
        let exec = RecordingExecutor::new();
        let err = exec
            .upload(Path::new("/nonexistent/deckhand/file"), "/tmp/x", false)
            .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ResourceNotFound);
        assert!(exec.commands().is_empty());
    }

    #[test]
    fn temp_dir_is_removed_on_drop() {
        let exec = RecordingExecutor::new();
        exec.respond("mktemp", CommandOutput::ok("/tmp/deckhand.abc123\n"));

        {
            let dir = RemoteTempDir::create(&exec).unwrap();
            assert_eq!(dir.join("build"), "/tmp/deckhand.abc123/build");
        }

        assert_eq!(
            exec.commands().last().map(String::as_str),
            Some("rm -rf /tmp/deckhand.abc123")
        );
    }

    #[test]
    fn temp_dir_rejects_relative_path() {
        let exec = RecordingExecutor::new();
        exec.respond("mktemp", CommandOutput::ok(""));
        assert!(RemoteTempDir::create(&exec).is_err());
    }
}

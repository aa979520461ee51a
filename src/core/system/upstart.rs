//! Upstart job management. Job variables are passed as `KEY=value` arguments.

use std::path::Path;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::local_files;
use crate::system::require_plain_name;
use crate::utils::shell::ShellCommand;

const INIT_DIR: &str = "/etc/init";

/// Upload a job definition to `/etc/init/<file name>`. Returns the remote path.
pub fn install(exec: &dyn Executor, local_file: &Path) -> Result<String> {
    local_files::require_resource(local_file)?;

    let name = local_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    require_plain_name("upstart job", &name)?;

    let remote = format!("{}/{}", INIT_DIR, name);
    log_status!("system", "Installing upstart job {}", remote);
    exec.upload(local_file, &remote, true)?;
    Ok(remote)
}

pub fn start(exec: &dyn Executor, name: &str, vars: &[(String, String)]) -> Result<()> {
    job_command(exec, "start", name, vars)
}

pub fn stop(exec: &dyn Executor, name: &str, vars: &[(String, String)]) -> Result<()> {
    job_command(exec, "stop", name, vars)
}

pub fn reload(exec: &dyn Executor, name: &str, vars: &[(String, String)]) -> Result<()> {
    job_command(exec, "reload", name, vars)
}

/// Restart a job. With `force_start`, a job whose `status` fails is started instead.
/// Returns the action taken (`restart` or `start`).
pub fn restart(
    exec: &dyn Executor,
    name: &str,
    force_start: bool,
    vars: &[(String, String)],
) -> Result<&'static str> {
    let mut action = "restart";

    if force_start {
        let status = exec.run_unchecked(&build("status", name, vars)?)?;
        if !status.success {
            action = "start";
        }
    }

    job_command(exec, action, name, vars)?;
    Ok(action)
}

/// Write `manual` to `/etc/init/<name>.override` so the job no longer starts on boot.
pub fn disable(exec: &dyn Executor, name: &str) -> Result<String> {
    require_plain_name("upstart job", name)?;

    let path = format!("{}/{}.override", INIT_DIR, name);
    exec.run(
        &ShellCommand::new("echo")
            .arg("manual")
            .pipe("tee")
            .elevated(true)
            .arg(&path)
            .stdout_to("/dev/null"),
    )?;
    Ok(path)
}

/// Parse `KEY=value` pairs from the command line.
pub fn parse_vars(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::validation_invalid_argument(
                    "var",
                    format!("Expected KEY=value, got '{}'", pair),
                    None,
                    None,
                )
            })?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn job_command(
    exec: &dyn Executor,
    action: &str,
    name: &str,
    vars: &[(String, String)],
) -> Result<()> {
    log_status!("system", "Running {} {}", action, name);
    exec.run(&build(action, name, vars)?)?;
    Ok(())
}

fn build(action: &str, name: &str, vars: &[(String, String)]) -> Result<ShellCommand> {
    require_plain_name("upstart job", name)?;

    let mut command = ShellCommand::sudo(action).arg(name);
    for (key, value) in vars {
        let valid_key = key
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_key {
            return Err(Error::validation_invalid_argument(
                "var",
                format!("'{}' is not a valid job variable name", key),
                None,
                None,
            ));
        }
        command = command.arg(format!("{}={}", key, value));
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::testing::RecordingExecutor;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn start_passes_job_variables() {
        let exec = RecordingExecutor::new();
        start(&exec, "web", &vars(&[("PORT", "12345")])).unwrap();
        assert_eq!(exec.commands(), vec!["sudo start web PORT=12345".to_string()]);
    }

    #[test]
    fn variable_values_are_quoted() {
        let exec = RecordingExecutor::new();
        stop(&exec, "web", &vars(&[("ARGS", "a b")])).unwrap();
        assert_eq!(exec.commands(), vec!["sudo stop web 'ARGS=a b'".to_string()]);
    }

    #[test]
    fn restart_running_job() {
        let exec = RecordingExecutor::new();
        let action = restart(&exec, "mongodb", true, &[]).unwrap();
        assert_eq!(action, "restart");
        assert_eq!(
            exec.commands(),
            vec![
                "sudo status mongodb".to_string(),
                "sudo restart mongodb".to_string()
            ]
        );
    }

    #[test]
    fn restart_starts_job_when_status_fails() {
        let exec = RecordingExecutor::new();
        exec.respond("status", CommandOutput::failure(1, "status: Unknown instance"));

        let action = restart(&exec, "mongodb", true, &[]).unwrap();
        assert_eq!(action, "start");
        assert_eq!(exec.commands()[1], "sudo start mongodb");
    }

    #[test]
    fn restart_without_force_skips_status() {
        let exec = RecordingExecutor::new();
        restart(&exec, "web", false, &[]).unwrap();
        assert_eq!(exec.commands(), vec!["sudo restart web".to_string()]);
    }

    #[test]
    fn disable_writes_override() {
        let exec = RecordingExecutor::new();
        let path = disable(&exec, "web").unwrap();
        assert_eq!(path, "/etc/init/web.override");
        assert_eq!(
            exec.commands(),
            vec!["echo manual | sudo tee /etc/init/web.override > '/dev/null'".to_string()]
        );
    }

    #[test]
    fn install_uploads_to_etc_init() {
        let exec = RecordingExecutor::new();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("web.conf");
        std::fs::write(&file, "exec /data/web/web/run\n").unwrap();

        let remote = install(&exec, &file).unwrap();
        assert_eq!(remote, "/etc/init/web.conf");
        assert_eq!(exec.uploads()[0].0, "sudo tee /etc/init/web.conf > '/dev/null'");
    }

    #[test]
    fn install_requires_local_file() {
        let exec = RecordingExecutor::new();
        let err = install(&exec, Path::new("/nonexistent/web.conf")).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ResourceNotFound);
    }

    #[test]
    fn parse_vars_splits_pairs() {
        let parsed = parse_vars(&["PORT=80".to_string(), "A=b=c".to_string()]).unwrap();
        assert_eq!(parsed, vars(&[("PORT", "80"), ("A", "b=c")]));
        assert!(parse_vars(&["PORT".to_string()]).is_err());
    }

    #[test]
    fn invalid_variable_names_are_rejected() {
        let exec = RecordingExecutor::new();
        assert!(start(&exec, "web", &vars(&[("1X", "y")])).is_err());
        assert!(exec.commands().is_empty());
    }
}

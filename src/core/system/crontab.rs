use std::path::Path;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::local_files;
use crate::system::require_plain_name;
use crate::utils::shell::ShellCommand;

/// Install a local cron file as `user`'s crontab.
///
/// The file is staged in a remote temp file, which is removed afterwards.
pub fn install(exec: &dyn Executor, local_file: &Path, user: &str) -> Result<()> {
    local_files::require_resource(local_file)?;
    require_plain_name("user", user)?;

    let staged = exec
        .run(&ShellCommand::new("mktemp").arg("deckhand-cron.XXXX"))?
        .stdout_trimmed()
        .to_string();
    if staged.is_empty() {
        return Err(Error::internal_unexpected(format!(
            "mktemp on {} returned no path",
            exec.target()
        )));
    }

    let installed = exec
        .upload(local_file, &staged, false)
        .and_then(|_| {
            log_status!("system", "Installing crontab for {}", user);
            exec.run(&ShellCommand::sudo("crontab").args(["-u", user, &staged]))
        });

    let _ = exec.run_unchecked(&ShellCommand::new("rm").args(["-f", &staged]));

    installed.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::testing::RecordingExecutor;

    fn cron_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.cron");
        std::fs::write(&file, "*/5 * * * * /data/app/app/bin/job\n").unwrap();
        (dir, file)
    }

    #[test]
    fn install_stages_file_and_runs_crontab() {
        let exec = RecordingExecutor::new();
        exec.respond("mktemp", CommandOutput::ok("deckhand-cron.Ab12\n"));
        let (_dir, file) = cron_file();

        install(&exec, &file, "www-data").unwrap();

        assert_eq!(
            exec.commands(),
            vec![
                "mktemp deckhand-cron.XXXX".to_string(),
                "cat > 'deckhand-cron.Ab12'".to_string(),
                "sudo crontab -u www-data deckhand-cron.Ab12".to_string(),
                "rm -f deckhand-cron.Ab12".to_string(),
            ]
        );
        assert_eq!(exec.uploads()[0].1, "*/5 * * * * /data/app/app/bin/job\n");
    }

    #[test]
    fn staged_file_is_removed_when_crontab_fails() {
        let exec = RecordingExecutor::new();
        exec.respond("mktemp", CommandOutput::ok("deckhand-cron.Ab12\n"));
        exec.respond("crontab", CommandOutput::failure(1, "bad minute"));
        let (_dir, file) = cron_file();

        let err = install(&exec, &file, "root").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::RemoteCommandFailed);
        assert!(exec.ran("rm -f deckhand-cron.Ab12"));
    }

    #[test]
    fn missing_cron_file_fails_fast() {
        let exec = RecordingExecutor::new();
        let err = install(&exec, Path::new("/nonexistent/app.cron"), "root").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ResourceNotFound);
        assert!(exec.commands().is_empty());
    }
}

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::release::SourceRepository;
use crate::utils::command;

/// A local git checkout that releases are archived from.
pub struct GitRepository {
    dir: PathBuf,
}

impl GitRepository {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let output = command::capture("git", &["rev-parse", "--git-dir"], Some(&dir))
            .map_err(|e| Error::git_command_failed(e.message))?;

        if !output.success {
            return Err(Error::git_command_failed(format!(
                "{} is not a git repository: {}",
                dir.display(),
                output.failure_text()
            ))
            .with_hint("Set the project's sourceDir to a local git checkout"));
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SourceRepository for GitRepository {
    fn resolve(&self, revision: &str) -> Result<String> {
        if revision.trim().is_empty() || revision.starts_with('-') {
            return Err(Error::git_revision_not_found(revision, "invalid revision name"));
        }

        let spec = format!("{}^{{commit}}", revision);
        let output = command::capture(
            "git",
            &["rev-parse", "--verify", "--quiet", spec.as_str()],
            Some(&self.dir),
        )?;

        if !output.success {
            return Err(Error::git_revision_not_found(revision, output.failure_text()));
        }

        let commit = output.stdout_trimmed().to_string();
        if commit.is_empty() {
            return Err(Error::git_revision_not_found(revision, "empty rev-parse output"));
        }
        Ok(commit)
    }

    fn archive(&self, commit: &str, destination: &Path) -> Result<()> {
        let dest = destination.to_string_lossy();
        let output = command::capture(
            "git",
            &["archive", "--format=tar.gz", "-o", &*dest, commit],
            Some(&self.dir),
        )?;

        if !output.success {
            return Err(Error::git_command_failed(format!(
                "git archive {} failed: {}",
                commit,
                output.failure_text()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        command::capture("git", &["--version"], None)
            .map(|o| o.success)
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let output = command::capture("git", args, Some(dir)).unwrap();
        assert!(output.success, "{}", output.failure_text());
    }

    fn repo_with_commit() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        std::fs::write(dir.path().join("app.py"), "print('hi')\n").unwrap();
        git(dir.path(), &["add", "app.py"]);
        git(
            dir.path(),
            &[
                "-c",
                "user.name=Deck Hand",
                "-c",
                "user.email=deckhand@example.com",
                "commit",
                "-q",
                "-m",
                "init",
            ],
        );
        dir
    }

    #[test]
    fn open_rejects_plain_directory() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = GitRepository::open(dir.path()).err().unwrap();
        assert_eq!(err.code, crate::ErrorCode::GitCommandFailed);
    }

    #[test]
    fn resolve_head_and_reject_unknown_revision() {
        if !git_available() {
            return;
        }
        let dir = repo_with_commit();
        let repo = GitRepository::open(dir.path()).unwrap();

        let commit = repo.resolve("HEAD").unwrap();
        assert_eq!(commit.len(), 40);

        let err = repo.resolve("no-such-branch").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::GitRevisionNotFound);
    }

    #[test]
    fn resolve_rejects_option_like_revision() {
        if !git_available() {
            return;
        }
        let dir = repo_with_commit();
        let repo = GitRepository::open(dir.path()).unwrap();
        assert!(repo.resolve("--all").is_err());
    }

    #[test]
    fn archive_writes_tarball() {
        if !git_available() {
            return;
        }
        let dir = repo_with_commit();
        let repo = GitRepository::open(dir.path()).unwrap();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("release.tar.gz");

        let commit = repo.resolve("HEAD").unwrap();
        repo.archive(&commit, &dest).unwrap();

        assert!(std::fs::metadata(&dest).unwrap().len() > 0);
    }
}

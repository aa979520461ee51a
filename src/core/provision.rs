//! Idempotent host provisioning on top of an [`Executor`].
//!
//! Every `ensure_*` operation probes first and mutates only when the probe says the
//! resource is missing, returning `true` when something changed.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::utils::shell::ShellCommand;

/// Package manager family of the target host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    #[default]
    Debian,
    RedHat,
}

/// System account to create when missing.
#[derive(Debug, Clone)]
pub struct UserSpec<'a> {
    pub name: &'a str,
    pub home: Option<&'a str>,
    pub shell: Option<&'a str>,
}

/// Result of a source-built install.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub component: String,
    pub version: String,
    pub install_dir: String,
    /// Already present and not forced.
    pub skipped: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages_installed: Vec<String>,
}

impl InstallOutcome {
    pub fn skipped(component: &str, version: &str, install_dir: &str) -> Self {
        Self {
            component: component.to_string(),
            version: version.to_string(),
            install_dir: install_dir.to_string(),
            skipped: true,
            packages_installed: Vec::new(),
        }
    }
}

/// Result of a confirmed (or declined) removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UninstallOutcome {
    Removed { path: String },
    Aborted { path: String },
}

/// Versions become path components; reject anything that is not a plain name.
pub fn require_version(version: &str) -> Result<()> {
    let valid = !version.is_empty()
        && !version.starts_with('.')
        && !version.starts_with('-')
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if valid {
        Ok(())
    } else {
        Err(Error::validation_invalid_argument(
            "version",
            format!("'{}' is not a valid version", version),
            Some(version.to_string()),
            None,
        ))
    }
}

/// Remove `<base>/<version>` (or all of `<base>` for `"all"`) after `confirm` approves.
pub fn uninstall_versioned(
    exec: &dyn Executor,
    base_dir: &str,
    version: &str,
    confirm: impl FnOnce(&str) -> bool,
) -> Result<UninstallOutcome> {
    let path = if version == "all" {
        base_dir.to_string()
    } else {
        require_version(version)?;
        format!("{}/{}", base_dir, version)
    };

    if !confirm(&path) {
        return Ok(UninstallOutcome::Aborted { path });
    }

    exec.run(&ShellCommand::sudo("rm").args(["-rf", &path]))?;
    Ok(UninstallOutcome::Removed { path })
}

/// Download a tarball and unpack it into `dir` (`wget -q <url> -O - | tar xz`).
pub fn fetch_tarball(exec: &dyn Executor, url: &str, dir: &str) -> Result<()> {
    exec.run(
        &ShellCommand::new("wget")
            .args(["-q", url, "-O", "-"])
            .pipe("tar")
            .arg("xz")
            .in_dir(dir),
    )?;
    Ok(())
}

pub trait Provisioner {
    fn ensure_package(&self, name: &str) -> Result<bool>;
    fn ensure_directory(&self, path: &str, owner: Option<&str>) -> Result<bool>;
    fn ensure_user(&self, user: &UserSpec<'_>) -> Result<bool>;
    fn file_exists(&self, path: &str) -> Result<bool>;
    /// Write `content` to `remote_path` (as root).
    fn write_file(&self, remote_path: &str, content: &str) -> Result<()>;
    /// Copy a local file to `remote_path` (as root).
    fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()>;
    fn update_index(&self) -> Result<()>;
    fn upgrade_packages(&self) -> Result<()>;
    fn install_packages(&self, names: &[String]) -> Result<()>;

    /// Ensure each package, returning the ones that had to be installed.
    fn ensure_packages(&self, names: &[String]) -> Result<Vec<String>> {
        let mut installed = Vec::new();
        for name in names {
            if self.ensure_package(name)? {
                installed.push(name.clone());
            }
        }
        Ok(installed)
    }
}

pub struct RemoteProvisioner<'a> {
    exec: &'a dyn Executor,
    os: TargetOs,
}

impl<'a> RemoteProvisioner<'a> {
    pub fn new(exec: &'a dyn Executor, os: TargetOs) -> Self {
        Self { exec, os }
    }

    pub fn exec(&self) -> &'a dyn Executor {
        self.exec
    }

    fn package_probe(&self, name: &str) -> ShellCommand {
        match self.os {
            TargetOs::Debian => ShellCommand::new("dpkg").args(["-s", name]),
            TargetOs::RedHat => ShellCommand::new("rpm").args(["-q", name]),
        }
    }

    fn apt_get() -> ShellCommand {
        ShellCommand::sudo("env").args(["DEBIAN_FRONTEND=noninteractive", "apt-get"])
    }
}

impl Provisioner for RemoteProvisioner<'_> {
    fn ensure_package(&self, name: &str) -> Result<bool> {
        if self.exec.succeeds(&self.package_probe(name))? {
            return Ok(false);
        }
        log_status!("provision", "Installing package {} on {}", name, self.exec.target());
        self.install_packages(&[name.to_string()])?;
        Ok(true)
    }

    fn ensure_directory(&self, path: &str, owner: Option<&str>) -> Result<bool> {
        if self
            .exec
            .succeeds(&ShellCommand::new("test").args(["-d", path]))?
        {
            return Ok(false);
        }

        self.exec
            .run(&ShellCommand::sudo("mkdir").args(["-p", path]))?;

        if let Some(owner) = owner {
            self.exec
                .run(&ShellCommand::sudo("chown").args([owner, path]))?;
        }
        Ok(true)
    }

    fn ensure_user(&self, user: &UserSpec<'_>) -> Result<bool> {
        if self
            .exec
            .succeeds(&ShellCommand::new("id").args(["-u", user.name]))?
        {
            return Ok(false);
        }

        let mut command = ShellCommand::sudo("useradd");
        if let Some(home) = user.home {
            command = command.args(["-d", home]);
        }
        if let Some(shell) = user.shell {
            command = command.args(["-s", shell]);
        }
        self.exec.run(&command.arg(user.name))?;
        Ok(true)
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        self.exec
            .succeeds(&ShellCommand::new("test").args(["-e", path]))
    }

    fn write_file(&self, remote_path: &str, content: &str) -> Result<()> {
        let mut staged = tempfile::NamedTempFile::new()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create temp file".to_string())))?;
        staged
            .write_all(content.as_bytes())
            .and_then(|_| staged.flush())
            .map_err(|e| Error::internal_io(e.to_string(), Some("write temp file".to_string())))?;

        self.exec.upload(staged.path(), remote_path, true)
    }

    fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.exec.upload(local_path, remote_path, true)
    }

    fn update_index(&self) -> Result<()> {
        let command = match self.os {
            TargetOs::Debian => Self::apt_get().args(["update", "-q"]),
            TargetOs::RedHat => ShellCommand::sudo("yum").args(["makecache", "-q"]),
        };
        self.exec.run(&command).map(|_| ())
    }

    fn upgrade_packages(&self) -> Result<()> {
        let command = match self.os {
            TargetOs::Debian => Self::apt_get().args(["upgrade", "-q", "-y"]),
            TargetOs::RedHat => ShellCommand::sudo("yum").args(["update", "-y"]),
        };
        self.exec.run(&command).map(|_| ())
    }

    fn install_packages(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let command = match self.os {
            TargetOs::Debian => Self::apt_get().args(["install", "-q", "-y"]),
            TargetOs::RedHat => ShellCommand::sudo("yum").args(["install", "-y"]),
        };
        self.exec.run(&command.args(names)).map(|_| ())
    }
}

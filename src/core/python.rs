//! CPython built from source under `<install_dir>/python/<version>`, plus the
//! setuptools and pip bootstrap for that interpreter.

use serde::Serialize;

use crate::defaults::Settings;
use crate::error::{Error, Result};
use crate::executor::{Executor, RemoteTempDir};
use crate::provision::{self, InstallOutcome, Provisioner, RemoteProvisioner, UninstallOutcome};
use crate::utils::shell::ShellCommand;
use crate::utils::template::{self, TemplateVars};

const SETUPTOOLS_RECORD: &str = "setuptools_files.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonLayout {
    pub version: String,
    pub dir: String,
}

impl PythonLayout {
    pub fn new(settings: &Settings, version: Option<&str>) -> Result<Self> {
        let version = version.unwrap_or(&settings.python.version).to_string();
        provision::require_version(&version)?;
        let dir = format!("{}/{}", base_dir(settings), version);
        Ok(Self { version, dir })
    }

    pub fn python(&self) -> String {
        format!("{}/bin/python", self.dir)
    }

    pub fn easy_install(&self) -> String {
        format!("{}/bin/easy_install", self.dir)
    }

    pub fn pip(&self) -> String {
        format!("{}/bin/pip", self.dir)
    }
}

fn base_dir(settings: &Settings) -> String {
    format!("{}/python", settings.python.install_dir.trim_end_matches('/'))
}

/// Outcome of a setuptools/pip step. `skipped` carries the reason nothing ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub tool: String,
    pub python_version: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl ToolOutcome {
    fn done(tool: &str, layout: &PythonLayout, action: &str) -> Self {
        Self {
            tool: tool.to_string(),
            python_version: layout.version.clone(),
            action: action.to_string(),
            skipped: None,
        }
    }

    fn skipped(tool: &str, layout: &PythonLayout, action: &str, reason: String) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::done(tool, layout, action)
        }
    }
}

/// Build and install an interpreter. An existing `bin/python` is left alone unless `force`.
pub fn install(
    exec: &dyn Executor,
    settings: &Settings,
    version: Option<&str>,
    force: bool,
) -> Result<InstallOutcome> {
    let layout = PythonLayout::new(settings, version)?;
    let prov = RemoteProvisioner::new(exec, settings.system.target_os);

    if !force && prov.file_exists(&layout.python())? {
        log_status!(
            "python",
            "Python {} found, skipping installation",
            layout.version
        );
        return Ok(InstallOutcome::skipped("python", &layout.version, &layout.dir));
    }

    let packages_installed = prov.ensure_packages(&settings.python.build_packages)?;

    let build = RemoteTempDir::create(exec)?;
    let url = template::render(
        &settings.python.download_url,
        &[(TemplateVars::VERSION, layout.version.as_str())],
    );
    log_status!("python", "Downloading {}", url);
    provision::fetch_tarball(exec, &url, build.path())?;

    let source = build.join(&format!("Python-{}", layout.version));
    log_status!("python", "Building Python {} into {}", layout.version, layout.dir);
    exec.run(
        &ShellCommand::new("./configure")
            .arg(format!("--prefix={}", layout.dir))
            .in_dir(&source),
    )?;
    exec.run(&ShellCommand::new("make").in_dir(&source))?;
    exec.run(&ShellCommand::sudo("make").arg("install").in_dir(&source))?;

    Ok(InstallOutcome {
        component: "python".to_string(),
        version: layout.version,
        install_dir: layout.dir,
        skipped: false,
        packages_installed,
    })
}

pub fn uninstall(
    exec: &dyn Executor,
    settings: &Settings,
    version: &str,
    confirm: impl FnOnce(&str) -> bool,
) -> Result<UninstallOutcome> {
    provision::uninstall_versioned(exec, &base_dir(settings), version, confirm)
}

pub fn install_setuptools(
    exec: &dyn Executor,
    settings: &Settings,
    version: Option<&str>,
) -> Result<ToolOutcome> {
    let layout = require_interpreter(exec, settings, version)?;
    let build = fetch_setuptools(exec, settings)?;

    log_status!("python", "Installing setuptools for Python {}", layout.version);
    exec.run(
        &ShellCommand::sudo(&layout.python())
            .args(["setup.py", "install"])
            .in_dir(&build.source),
    )?;

    Ok(ToolOutcome::done("setuptools", &layout, "install"))
}

/// Re-run the setuptools install with `--record`, then delete every recorded file.
pub fn uninstall_setuptools(
    exec: &dyn Executor,
    settings: &Settings,
    version: Option<&str>,
) -> Result<ToolOutcome> {
    let layout = require_interpreter(exec, settings, version)?;
    let build = fetch_setuptools(exec, settings)?;

    log_status!("python", "Removing setuptools from Python {}", layout.version);
    exec.run(
        &ShellCommand::sudo(&layout.python())
            .args(["setup.py", "install", "--record", SETUPTOOLS_RECORD])
            .in_dir(&build.source),
    )?;
    exec.run(
        &ShellCommand::new("cat")
            .arg(SETUPTOOLS_RECORD)
            .pipe("xargs")
            .elevated(true)
            .args(["rm", "-rf"])
            .in_dir(&build.source),
    )?;

    Ok(ToolOutcome::done("setuptools", &layout, "uninstall"))
}

/// `easy_install pip`. Skipped when the interpreter has no `easy_install`.
pub fn install_pip(exec: &dyn Executor, settings: &Settings, version: Option<&str>) -> Result<ToolOutcome> {
    let layout = PythonLayout::new(settings, version)?;
    let easy_install = layout.easy_install();

    if !exec.succeeds(&ShellCommand::new("test").args(["-x", &easy_install]))? {
        log_status!("python", "{} not found, install setuptools first", easy_install);
        return Ok(ToolOutcome::skipped(
            "pip",
            &layout,
            "install",
            format!("{} not found", easy_install),
        ));
    }

    exec.run(&ShellCommand::sudo(&easy_install).arg("pip"))?;
    Ok(ToolOutcome::done("pip", &layout, "install"))
}

/// `pip uninstall -y pip`. Skipped when pip is not installed.
pub fn uninstall_pip(exec: &dyn Executor, settings: &Settings, version: Option<&str>) -> Result<ToolOutcome> {
    let layout = PythonLayout::new(settings, version)?;
    let pip = layout.pip();

    if !exec.succeeds(&ShellCommand::new("test").args(["-x", &pip]))? {
        log_status!("python", "{} not found, nothing to remove", pip);
        return Ok(ToolOutcome::skipped(
            "pip",
            &layout,
            "uninstall",
            format!("{} not found", pip),
        ));
    }

    exec.run(&ShellCommand::sudo(&pip).args(["uninstall", "-y", "pip"]))?;
    Ok(ToolOutcome::done("pip", &layout, "uninstall"))
}

fn require_interpreter(exec: &dyn Executor, settings: &Settings, version: Option<&str>) -> Result<PythonLayout> {
    let layout = PythonLayout::new(settings, version)?;
    if !exec.succeeds(&ShellCommand::new("test").args(["-x", &layout.python()]))? {
        return Err(Error::validation_invalid_argument(
            "version",
            format!("Python {} is not installed on {}", layout.version, exec.target()),
            Some(layout.version.clone()),
            None,
        )
        .with_hint(format!("Run 'deckhand python install --version {}' first", layout.version)));
    }
    Ok(layout)
}

struct SetuptoolsBuild<'a> {
    // Holds the temp dir alive; removed on drop.
    _dir: RemoteTempDir<'a>,
    source: String,
}

/// Download and unpack the setuptools tarball; the source dir is named after the archive.
fn fetch_setuptools<'a>(exec: &'a dyn Executor, settings: &Settings) -> Result<SetuptoolsBuild<'a>> {
    let url = &settings.python.setuptools_url;
    let source_name = archive_stem(url).ok_or_else(|| {
        Error::config_invalid_value(
            "python.setuptools_url",
            Some(url.clone()),
            "URL must end in a .tar.gz or .tgz file name",
        )
    })?;

    // setup.py runs as root and leaves root-owned build files behind.
    let dir = RemoteTempDir::create(exec)?.with_sudo_cleanup();
    provision::fetch_tarball(exec, url, dir.path())?;
    let source = dir.join(&source_name);

    Ok(SetuptoolsBuild { _dir: dir, source })
}

fn archive_stem(url: &str) -> Option<String> {
    let file = url.rsplit('/').next()?;
    let stem = file
        .strip_suffix(".tar.gz")
        .or_else(|| file.strip_suffix(".tgz"))?;
    (!stem.is_empty()).then(|| stem.to_string())
}

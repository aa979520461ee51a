//! Nginx built from source under `<install_dir>/nginx/<version>`.
//!
//! Layout of an install:
//!
//! ```text
//! /opt/nginx/1.2.6/
//! ├── sbin/nginx
//! ├── logs/nginx.pid
//! ├── html/                 home of the nginx user
//! └── conf/
//!     ├── nginx.conf
//!     └── sites-enabled/
//! ```

use std::path::Path;

use crate::defaults::Settings;
use crate::error::Result;
use crate::executor::{Executor, RemoteTempDir};
use crate::local_files;
use crate::provision::{
    self, InstallOutcome, Provisioner, RemoteProvisioner, UninstallOutcome, UserSpec,
};
use crate::system::require_plain_name;
use crate::utils::shell::ShellCommand;
use crate::utils::template::{self, TemplateVars};

const UPSTART_PATH: &str = "/etc/init/nginx.conf";

const UPSTART_TEMPLATE: &str = r#"description "nginx http daemon"

start on (filesystem and net-device-up IFACE!=lo)
stop on runlevel [!2345]

env DAEMON={{nginx_bin}}
env PID={{nginx_pid}}

expect fork
respawn
respawn limit 10 5

pre-start script
    $DAEMON -t
    if [ $? -ne 0 ]
        then exit $?
    fi
end script

exec $DAEMON
"#;

/// Paths of one nginx version on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NginxLayout {
    pub version: String,
    pub dir: String,
}

impl NginxLayout {
    pub fn new(settings: &Settings, version: Option<&str>) -> Result<Self> {
        let version = version.unwrap_or(&settings.nginx.version).to_string();
        provision::require_version(&version)?;
        let dir = format!("{}/{}", base_dir(settings), version);
        Ok(Self { version, dir })
    }

    pub fn bin(&self) -> String {
        format!("{}/sbin/nginx", self.dir)
    }

    pub fn pid_file(&self) -> String {
        format!("{}/logs/nginx.pid", self.dir)
    }

    pub fn home(&self) -> String {
        format!("{}/html", self.dir)
    }

    pub fn conf(&self) -> String {
        format!("{}/conf/nginx.conf", self.dir)
    }

    pub fn sites_enabled(&self) -> String {
        format!("{}/conf/sites-enabled", self.dir)
    }
}

fn base_dir(settings: &Settings) -> String {
    format!("{}/nginx", settings.nginx.install_dir.trim_end_matches('/'))
}

/// Build and install nginx. An existing binary is left alone unless `force` is set.
pub fn install(
    exec: &dyn Executor,
    settings: &Settings,
    version: Option<&str>,
    force: bool,
) -> Result<InstallOutcome> {
    let layout = NginxLayout::new(settings, version)?;
    let prov = RemoteProvisioner::new(exec, settings.system.target_os);

    if !force && prov.file_exists(&layout.bin())? {
        log_status!(
            "nginx",
            "Nginx {} found, skipping installation",
            layout.version
        );
        return Ok(InstallOutcome::skipped("nginx", &layout.version, &layout.dir));
    }

    let packages_installed = prov.ensure_packages(&settings.nginx.build_packages)?;
    prov.ensure_directory(&layout.dir, None)?;

    let user = &settings.nginx.user;
    require_plain_name("user", user)?;
    let home = layout.home();
    let created = prov.ensure_user(&UserSpec {
        name: user,
        home: Some(&home),
        shell: Some("/sbin/nologin"),
    })?;
    if created {
        exec.run(&ShellCommand::sudo("passwd").args(["-l", user]))?;
    }

    let build = RemoteTempDir::create(exec)?;
    let url = template::render(
        &settings.nginx.download_url,
        &[(TemplateVars::VERSION, layout.version.as_str())],
    );
    log_status!("nginx", "Downloading {}", url);
    provision::fetch_tarball(exec, &url, build.path())?;

    let source = build.join(&format!("nginx-{}", layout.version));
    log_status!("nginx", "Building nginx {} into {}", layout.version, layout.dir);
    exec.run(
        &ShellCommand::new("./configure")
            .arg(format!("--prefix={}", layout.dir))
            .args(&settings.nginx.configure_flags)
            .in_dir(&source),
    )?;
    exec.run(&ShellCommand::new("make").in_dir(&source))?;
    exec.run(&ShellCommand::sudo("make").arg("install").in_dir(&source))?;

    exec.run(&ShellCommand::sudo("mkdir").args(["-p", &layout.sites_enabled()]))?;

    Ok(InstallOutcome {
        component: "nginx".to_string(),
        version: layout.version,
        install_dir: layout.dir,
        skipped: false,
        packages_installed,
    })
}

/// Remove one version, or every version with `"all"`.
pub fn uninstall(
    exec: &dyn Executor,
    settings: &Settings,
    version: &str,
    confirm: impl FnOnce(&str) -> bool,
) -> Result<UninstallOutcome> {
    provision::uninstall_versioned(exec, &base_dir(settings), version, confirm)
}

/// Write the upstart job for this version to `/etc/init/nginx.conf`.
pub fn install_upstart(exec: &dyn Executor, settings: &Settings, version: Option<&str>) -> Result<String> {
    let layout = NginxLayout::new(settings, version)?;
    let content = template::render(
        UPSTART_TEMPLATE,
        &[
            (TemplateVars::NGINX_BIN, layout.bin().as_str()),
            (TemplateVars::NGINX_PID, layout.pid_file().as_str()),
        ],
    );

    log_status!("nginx", "Installing upstart job {}", UPSTART_PATH);
    RemoteProvisioner::new(exec, settings.system.target_os).write_file(UPSTART_PATH, &content)?;
    Ok(UPSTART_PATH.to_string())
}

/// Render a local `nginx.conf` (`{{nginx_user}}`, `{{nginx_pid}}`) into the install.
pub fn install_conf(
    exec: &dyn Executor,
    settings: &Settings,
    version: Option<&str>,
    local_file: &Path,
) -> Result<String> {
    let layout = NginxLayout::new(settings, version)?;
    let raw = local_files::read_resource(local_file)?;
    let content = template::render(
        &raw,
        &[
            (TemplateVars::NGINX_USER, settings.nginx.user.as_str()),
            (TemplateVars::NGINX_PID, layout.pid_file().as_str()),
        ],
    );

    let remote = layout.conf();
    log_status!("nginx", "Installing {}", remote);
    RemoteProvisioner::new(exec, settings.system.target_os).write_file(&remote, &content)?;
    Ok(remote)
}

/// Upload a site config into `conf/sites-enabled/`, keeping its file name.
pub fn install_site_conf(
    exec: &dyn Executor,
    settings: &Settings,
    version: Option<&str>,
    local_file: &Path,
) -> Result<String> {
    let layout = NginxLayout::new(settings, version)?;
    local_files::require_resource(local_file)?;

    let name = local_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    require_plain_name("site config", &name)?;

    let remote = format!("{}/{}", layout.sites_enabled(), name);
    log_status!("nginx", "Installing site config {}", remote);
    RemoteProvisioner::new(exec, settings.system.target_os).upload_file(local_file, &remote)?;
    Ok(remote)
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupOutcome {
    pub install: InstallOutcome,
    pub upstart: String,
    pub conf: String,
    pub site_conf: String,
}

/// Install (unless present), then the upstart job, main config and one site config.
pub fn setup(
    exec: &dyn Executor,
    settings: &Settings,
    version: Option<&str>,
    conf_file: &Path,
    site_file: &Path,
) -> Result<SetupOutcome> {
    local_files::require_resource(conf_file)?;
    local_files::require_resource(site_file)?;

    let install = install(exec, settings, version, false)?;
    let version = Some(install.version.as_str());
    let upstart = install_upstart(exec, settings, version)?;
    let conf = install_conf(exec, settings, version, conf_file)?;
    let site_conf = install_site_conf(exec, settings, version, site_file)?;

    Ok(SetupOutcome {
        install,
        upstart,
        conf,
        site_conf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::testing::RecordingExecutor;

    fn fresh_host() -> RecordingExecutor {
        let exec = RecordingExecutor::new();
        exec.respond(
            "test -e /opt/nginx/1.2.6/sbin/nginx",
            CommandOutput::failure(1, ""),
        );
        exec.respond("mktemp", CommandOutput::ok("/tmp/deckhand.k2"));
        exec
    }

    #[test]
    fn existing_install_is_skipped() {
        let exec = RecordingExecutor::new();
        let outcome = install(&exec, &Settings::default(), None, false).unwrap();

        assert!(outcome.skipped);
        assert_eq!(outcome.install_dir, "/opt/nginx/1.2.6");
        assert_eq!(
            exec.commands(),
            vec!["test -e /opt/nginx/1.2.6/sbin/nginx".to_string()]
        );
    }

    #[test]
    fn install_builds_from_source() {
        let exec = fresh_host();
        let outcome = install(&exec, &Settings::default(), None, false).unwrap();

        assert!(!outcome.skipped);
        let commands = exec.commands();
        assert!(commands.contains(
            &"cd '/tmp/deckhand.k2' && wget -q http://nginx.org/download/nginx-1.2.6.tar.gz -O - | tar xz"
                .to_string()
        ));
        assert!(commands.contains(
            &"cd '/tmp/deckhand.k2/nginx-1.2.6' && ./configure --prefix=/opt/nginx/1.2.6 --with-http_stub_status_module"
                .to_string()
        ));
        assert!(commands.contains(&"cd '/tmp/deckhand.k2/nginx-1.2.6' && sudo make install".to_string()));
        assert!(commands.contains(&"sudo mkdir -p /opt/nginx/1.2.6/conf/sites-enabled".to_string()));

        let make = exec.position("&& make").unwrap();
        let make_install = exec.position("sudo make install").unwrap();
        assert!(make < make_install);
        assert_eq!(commands.last().unwrap(), "rm -rf /tmp/deckhand.k2");
    }

    #[test]
    fn new_nginx_user_is_locked() {
        let exec = fresh_host();
        exec.respond("id -u nginx", CommandOutput::failure(1, "no such user"));

        install(&exec, &Settings::default(), None, false).unwrap();

        assert!(exec.ran("sudo useradd -d /opt/nginx/1.2.6/html -s /sbin/nologin nginx"));
        assert!(exec.ran("sudo passwd -l nginx"));
    }

    #[test]
    fn force_reinstalls_over_existing_binary() {
        let exec = RecordingExecutor::new();
        exec.respond("mktemp", CommandOutput::ok("/tmp/deckhand.k2"));

        let outcome = install(&exec, &Settings::default(), Some("1.4.1"), true).unwrap();
        assert!(!outcome.skipped);
        assert!(!exec.ran("test -e"));
        assert!(exec.ran("nginx-1.4.1.tar.gz"));
    }

    #[test]
    fn failed_build_still_removes_build_dir() {
        let exec = fresh_host();
        exec.respond("./configure", CommandOutput::failure(1, "PCRE library not found"));

        let err = install(&exec, &Settings::default(), None, false).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::RemoteCommandFailed);
        assert!(!exec.ran("make"));
        assert!(exec.ran("rm -rf /tmp/deckhand.k2"));
    }

    #[test]
    fn upstart_job_points_at_version() {
        let exec = RecordingExecutor::new();
        let path = install_upstart(&exec, &Settings::default(), None).unwrap();

        assert_eq!(path, "/etc/init/nginx.conf");
        let uploads = exec.uploads();
        assert!(uploads[0].1.contains("env DAEMON=/opt/nginx/1.2.6/sbin/nginx"));
        assert!(uploads[0].1.contains("env PID=/opt/nginx/1.2.6/logs/nginx.pid"));
    }

    #[test]
    fn conf_is_rendered_with_user_and_pid() {
        let exec = RecordingExecutor::new();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nginx.conf");
        std::fs::write(&file, "user {{nginx_user}};\npid {{nginx_pid}};\n").unwrap();

        let remote = install_conf(&exec, &Settings::default(), None, &file).unwrap();

        assert_eq!(remote, "/opt/nginx/1.2.6/conf/nginx.conf");
        assert_eq!(
            exec.uploads()[0].1,
            "user nginx;\npid /opt/nginx/1.2.6/logs/nginx.pid;\n"
        );
    }

    #[test]
    fn site_conf_keeps_file_name() {
        let exec = RecordingExecutor::new();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.conf");
        std::fs::write(&file, "server { listen 80; }\n").unwrap();

        let remote = install_site_conf(&exec, &Settings::default(), None, &file).unwrap();
        assert_eq!(remote, "/opt/nginx/1.2.6/conf/sites-enabled/app.conf");
    }

    #[test]
    fn setup_checks_local_files_before_touching_host() {
        let exec = RecordingExecutor::new();
        let err = setup(
            &exec,
            &Settings::default(),
            None,
            Path::new("/nonexistent/nginx.conf"),
            Path::new("/nonexistent/app.conf"),
        )
        .unwrap_err();

        assert_eq!(err.code, crate::ErrorCode::ResourceNotFound);
        assert!(exec.commands().is_empty());
    }

    #[test]
    fn uninstall_targets_versioned_dir() {
        let exec = RecordingExecutor::new();
        let outcome = uninstall(&exec, &Settings::default(), "1.2.6", |_| true).unwrap();
        assert_eq!(
            outcome,
            UninstallOutcome::Removed {
                path: "/opt/nginx/1.2.6".to_string()
            }
        );
    }
}

//! Resolution of the project, server, and settings an operation runs against.
//!
//! Every command resolves a [`DeployContext`] once and passes it by reference; there is
//! no process-wide "current project".

use crate::defaults::{self, Settings};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::project::{self, Project};
use crate::server::{self, Server};
use crate::ssh::SshClient;

/// Everything a release operation needs: the project record, effective settings and
/// the executor bound to the project's server.
pub struct DeployContext<'a> {
    pub project: Project,
    pub settings: Settings,
    pub exec: &'a dyn Executor,
}

impl<'a> DeployContext<'a> {
    pub fn new(project: Project, settings: Settings, exec: &'a dyn Executor) -> Self {
        Self {
            project,
            settings,
            exec,
        }
    }

    pub fn name(&self) -> &str {
        &self.project.id
    }

    pub fn install_root(&self) -> &str {
        self.project
            .install_root
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.settings.deploy.install_root)
    }

    /// `<install_root>/<project>`
    pub fn project_dir(&self) -> String {
        format!("{}/{}", self.install_root().trim_end_matches('/'), self.name())
    }

    pub fn releases_dir(&self) -> String {
        format!("{}/releases", self.project_dir())
    }

    pub fn release_dir(&self, release_id: &str) -> String {
        format!("{}/{}", self.releases_dir(), release_id)
    }

    /// The symlink naming the live release: `<install_root>/<project>/<project>`
    pub fn live_link(&self) -> String {
        format!("{}/{}", self.project_dir(), self.name())
    }

    pub fn lock_dir(&self) -> String {
        format!("{}/.deploy.lock", self.project_dir())
    }

    pub fn keep_releases(&self) -> usize {
        self.project
            .keep_releases
            .unwrap_or(self.settings.deploy.keep_releases)
    }

    pub fn use_sudo(&self) -> bool {
        self.settings.deploy.use_sudo
    }
}

/// A project together with the server it deploys to.
pub struct ProjectServerContext {
    pub project: Project,
    pub server_id: String,
    pub server: Server,
}

pub fn resolve_project_server(project_id: &str) -> Result<ProjectServerContext> {
    let project = project::load(project_id)?;

    let server_id = project
        .server_id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::config_missing_key("project.serverId", Some(project_id.to_string()))
                .with_hint(format!(
                    "Run 'deckhand project set-server {} <server-id>'",
                    project_id
                ))
        })?;

    let server = server::load(&server_id)?;

    Ok(ProjectServerContext {
        project,
        server_id,
        server,
    })
}

/// Project context plus a connected client; the caller builds a [`DeployContext`]
/// borrowing the client.
pub struct RemoteProjectContext {
    pub project: Project,
    pub server_id: String,
    pub client: SshClient,
    pub settings: Settings,
}

impl RemoteProjectContext {
    pub fn deploy_context(&self) -> DeployContext<'_> {
        DeployContext::new(self.project.clone(), self.settings.clone(), &self.client)
    }
}

pub fn resolve_project_ssh(project_id: &str) -> Result<RemoteProjectContext> {
    let settings = defaults::load_settings()?;
    let ctx = resolve_project_server(project_id)?;
    let client = SshClient::from_server(&ctx.server, &ctx.server_id)?;

    Ok(RemoteProjectContext {
        project: ctx.project,
        server_id: ctx.server_id,
        client,
        settings,
    })
}

/// Connection for host-level commands (installers, system utilities).
pub struct RemoteHostContext {
    pub server_id: String,
    pub client: SshClient,
    pub settings: Settings,
}

/// Resolve `--server <id>` directly, or the server of `--project <id>`.
pub fn resolve_host(server_id: Option<&str>, project_id: Option<&str>) -> Result<RemoteHostContext> {
    let settings = defaults::load_settings()?;

    let (server_id, server) = match (server_id, project_id) {
        (Some(id), _) => (id.to_string(), server::load(id)?),
        (None, Some(project_id)) => {
            let ctx = resolve_project_server(project_id)?;
            (ctx.server_id, ctx.server)
        }
        (None, None) => {
            return Err(Error::validation_missing_argument(vec![
                "--server".to_string(),
                "--project".to_string(),
            ])
            .with_hint("Pass --server <id> or --project <id>"))
        }
    };

    let client = SshClient::from_server(&server, &server_id)?;

    Ok(RemoteHostContext {
        server_id,
        client,
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    fn project(install_root: Option<&str>) -> Project {
        Project {
            id: "shop".to_string(),
            install_root: install_root.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn layout_uses_default_install_root() {
        let exec = RecordingExecutor::new();
        let ctx = DeployContext::new(project(None), Settings::default(), &exec);

        assert_eq!(ctx.project_dir(), "/data/shop");
        assert_eq!(ctx.releases_dir(), "/data/shop/releases");
        assert_eq!(ctx.live_link(), "/data/shop/shop");
        assert_eq!(ctx.lock_dir(), "/data/shop/.deploy.lock");
        assert_eq!(ctx.keep_releases(), 5);
    }

    #[test]
    fn project_install_root_overrides_setting() {
        let exec = RecordingExecutor::new();
        let ctx = DeployContext::new(project(Some("/srv/")), Settings::default(), &exec);

        assert_eq!(ctx.project_dir(), "/srv/shop");
        assert_eq!(
            ctx.release_dir("20240101-000000-0a1b2c3d"),
            "/srv/shop/releases/20240101-000000-0a1b2c3d"
        );
    }

    #[test]
    fn project_keep_releases_overrides_setting() {
        let exec = RecordingExecutor::new();
        let mut p = project(None);
        p.keep_releases = Some(2);
        let ctx = DeployContext::new(p, Settings::default(), &exec);
        assert_eq!(ctx.keep_releases(), 2);
    }
}

use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use deckhand::nginx::{self, SetupOutcome};
use deckhand::provision::{InstallOutcome, UninstallOutcome};

use super::{CmdResult, HostArgs};

#[derive(Args)]
pub struct NginxArgs {
    #[command(flatten)]
    host: HostArgs,

    #[command(subcommand)]
    command: NginxCommand,
}

#[derive(Subcommand)]
enum NginxCommand {
    /// Build nginx from source
    Install {
        /// Version to build (default: nginx.version)
        version: Option<String>,
        /// Rebuild even when the binary exists
        #[arg(long)]
        force: bool,
    },
    /// Remove one version, or every version with "all"
    Uninstall {
        /// Version or "all"
        version: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Install the upstart job for a version
    Upstart {
        version: Option<String>,
    },
    /// Upload the main nginx.conf (rendered with nginx_user and nginx_pid)
    Conf {
        /// Local nginx.conf template
        file: PathBuf,
        #[arg(long)]
        version: Option<String>,
    },
    /// Upload a site config into conf/sites-enabled
    SiteConf {
        /// Local site config
        file: PathBuf,
        #[arg(long)]
        version: Option<String>,
    },
    /// Install, then upstart job, main config and site config
    Setup {
        /// Local nginx.conf template
        conf: PathBuf,
        /// Local site config
        site: PathBuf,
        #[arg(long)]
        version: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum NginxOutput {
    #[serde(rename = "nginx.install")]
    Install {
        #[serde(flatten)]
        outcome: InstallOutcome,
    },
    #[serde(rename = "nginx.uninstall")]
    Uninstall {
        #[serde(flatten)]
        outcome: UninstallOutcome,
    },
    #[serde(rename = "nginx.upstart")]
    Upstart { path: String },
    #[serde(rename = "nginx.conf")]
    Conf { path: String },
    #[serde(rename = "nginx.site_conf")]
    SiteConf { path: String },
    #[serde(rename = "nginx.setup")]
    Setup {
        #[serde(flatten)]
        outcome: SetupOutcome,
    },
}

pub fn run(args: NginxArgs, _global: &super::GlobalArgs) -> CmdResult<NginxOutput> {
    let remote = args.host.resolve()?;
    let exec = &remote.client;
    let settings = &remote.settings;

    let output = match args.command {
        NginxCommand::Install { version, force } => NginxOutput::Install {
            outcome: nginx::install(exec, settings, version.as_deref(), force)?,
        },
        NginxCommand::Uninstall { version, yes } => NginxOutput::Uninstall {
            outcome: nginx::uninstall(exec, settings, &version, |path| {
                crate::tty::confirm(&format!("Remove {} on {}?", path, remote.server_id), yes)
            })?,
        },
        NginxCommand::Upstart { version } => NginxOutput::Upstart {
            path: nginx::install_upstart(exec, settings, version.as_deref())?,
        },
        NginxCommand::Conf { file, version } => NginxOutput::Conf {
            path: nginx::install_conf(exec, settings, version.as_deref(), &file)?,
        },
        NginxCommand::SiteConf { file, version } => NginxOutput::SiteConf {
            path: nginx::install_site_conf(exec, settings, version.as_deref(), &file)?,
        },
        NginxCommand::Setup {
            conf,
            site,
            version,
        } => NginxOutput::Setup {
            outcome: nginx::setup(exec, settings, version.as_deref(), &conf, &site)?,
        },
    };

    Ok((output, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_uninstall_reports_aborted_status() {
        let output = NginxOutput::Uninstall {
            outcome: UninstallOutcome::Aborted {
                path: "/opt/nginx/1.2.6".to_string(),
            },
        };
        let json = serde_json::to_value(output).unwrap();
        assert_eq!(json["command"], "nginx.uninstall");
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["path"], "/opt/nginx/1.2.6");
    }
}

use clap::{Args, Subcommand};
use serde::Serialize;
use std::time::Duration;

use deckhand::system;

use super::{CmdResult, HostArgs};

#[derive(Args)]
pub struct SystemArgs {
    #[command(flatten)]
    host: HostArgs,

    #[command(subcommand)]
    command: SystemCommand,
}

#[derive(Subcommand)]
enum SystemCommand {
    /// Import an apt signing key
    AptKey {
        /// Key ID
        key: String,
        /// Keyserver (default: system.keyserver)
        #[arg(long)]
        keyserver: Option<String>,
    },
    /// Add an apt source list
    AptRepo {
        /// Repository name (file name and component)
        name: String,
        /// Distribution, e.g. "dist"
        distro: String,
        /// Repository URL
        url: String,
    },
    /// Reboot the host after a grace period
    Reboot {
        /// Seconds to wait first (default: system.reboot_delay_secs)
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Restart an init.d service
    RestartService { name: String },
    /// Reload an init.d service
    ReloadService { name: String },
}

#[derive(Serialize)]
#[serde(tag = "command", rename_all_fields = "camelCase")]
pub enum SystemOutput {
    #[serde(rename = "system.apt_key")]
    AptKey { key: String, keyserver: String },
    #[serde(rename = "system.apt_repo")]
    AptRepo { name: String, path: String },
    #[serde(rename = "system.reboot")]
    Reboot { server_id: String, delay_secs: u64 },
    #[serde(rename = "system.service")]
    Service { name: String, action: &'static str },
}

pub fn run(args: SystemArgs, _global: &super::GlobalArgs) -> CmdResult<SystemOutput> {
    let remote = args.host.resolve()?;
    let exec = &remote.client;

    let output = match args.command {
        SystemCommand::AptKey { key, keyserver } => {
            let keyserver = keyserver.unwrap_or_else(|| remote.settings.system.keyserver.clone());
            system::apt_import_pubkey(exec, &key, &keyserver)?;
            SystemOutput::AptKey { key, keyserver }
        }
        SystemCommand::AptRepo { name, distro, url } => {
            let path = system::apt_add_repository(exec, &name, &distro, &url)?;
            SystemOutput::AptRepo { name, path }
        }
        SystemCommand::Reboot { delay } => {
            let delay_secs = delay.unwrap_or(remote.settings.system.reboot_delay_secs);
            system::reboot(exec, Duration::from_secs(delay_secs), std::thread::sleep)?;
            SystemOutput::Reboot {
                server_id: remote.server_id.clone(),
                delay_secs,
            }
        }
        SystemCommand::RestartService { name } => {
            system::restart_service(exec, &name)?;
            SystemOutput::Service {
                name,
                action: "restart",
            }
        }
        SystemCommand::ReloadService { name } => {
            system::reload_service(exec, &name)?;
            SystemOutput::Service {
                name,
                action: "reload",
            }
        }
    };

    Ok((output, 0))
}

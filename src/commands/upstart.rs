use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use deckhand::system::upstart;

use super::{CmdResult, HostArgs};

#[derive(Args)]
pub struct UpstartArgs {
    #[command(flatten)]
    host: HostArgs,

    #[command(subcommand)]
    command: UpstartCommand,
}

/// Job name plus `KEY=value` variables passed through to initctl.
#[derive(Args)]
struct JobArgs {
    /// Job name
    name: String,
    /// Job variable (KEY=value), repeatable
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
}

#[derive(Subcommand)]
enum UpstartCommand {
    /// Upload a job definition to /etc/init
    Install {
        /// Local job file; its name becomes the job name
        file: PathBuf,
    },
    /// Start a job
    Start(JobArgs),
    /// Stop a job
    Stop(JobArgs),
    /// Reload a job's configuration
    Reload(JobArgs),
    /// Restart a job
    Restart {
        #[command(flatten)]
        job: JobArgs,
        /// Start the job instead when it is not running
        #[arg(long)]
        force_start: bool,
    },
    /// Stop a job from starting on boot
    Disable { name: String },
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum UpstartOutput {
    #[serde(rename = "upstart.install")]
    Install { path: String },
    #[serde(rename = "upstart.job")]
    Job { name: String, action: &'static str },
    #[serde(rename = "upstart.disable")]
    Disable { name: String, path: String },
}

pub fn run(args: UpstartArgs, _global: &super::GlobalArgs) -> CmdResult<UpstartOutput> {
    let remote = args.host.resolve()?;
    let exec = &remote.client;

    let output = match args.command {
        UpstartCommand::Install { file } => UpstartOutput::Install {
            path: upstart::install(exec, &file)?,
        },
        UpstartCommand::Start(job) => {
            upstart::start(exec, &job.name, &upstart::parse_vars(&job.vars)?)?;
            UpstartOutput::Job {
                name: job.name,
                action: "start",
            }
        }
        UpstartCommand::Stop(job) => {
            upstart::stop(exec, &job.name, &upstart::parse_vars(&job.vars)?)?;
            UpstartOutput::Job {
                name: job.name,
                action: "stop",
            }
        }
        UpstartCommand::Reload(job) => {
            upstart::reload(exec, &job.name, &upstart::parse_vars(&job.vars)?)?;
            UpstartOutput::Job {
                name: job.name,
                action: "reload",
            }
        }
        UpstartCommand::Restart { job, force_start } => {
            let vars = upstart::parse_vars(&job.vars)?;
            let action = upstart::restart(exec, &job.name, force_start, &vars)?;
            UpstartOutput::Job {
                name: job.name,
                action,
            }
        }
        UpstartCommand::Disable { name } => {
            let path = upstart::disable(exec, &name)?;
            UpstartOutput::Disable { name, path }
        }
    };

    Ok((output, 0))
}

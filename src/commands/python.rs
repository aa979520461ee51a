use clap::{Args, Subcommand};
use serde::Serialize;

use deckhand::provision::{InstallOutcome, UninstallOutcome};
use deckhand::python::{self, ToolOutcome};

use super::{CmdResult, HostArgs};

#[derive(Args)]
pub struct PythonArgs {
    #[command(flatten)]
    host: HostArgs,

    #[command(subcommand)]
    command: PythonCommand,
}

#[derive(Subcommand)]
enum PythonCommand {
    /// Build a Python interpreter from source
    Install {
        /// Version to build (default: python.version)
        version: Option<String>,
        /// Rebuild even when the interpreter exists
        #[arg(long)]
        force: bool,
    },
    /// Remove one interpreter, or every version with "all"
    Uninstall {
        /// Version or "all"
        version: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Install setuptools into an interpreter
    SetuptoolsInstall {
        /// Interpreter version (default: python.version)
        py_version: Option<String>,
    },
    /// Remove the files setuptools installed
    SetuptoolsUninstall {
        py_version: Option<String>,
    },
    /// Install pip with the interpreter's easy_install
    PipInstall {
        py_version: Option<String>,
    },
    /// Uninstall pip from the interpreter
    PipUninstall {
        py_version: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum PythonOutput {
    #[serde(rename = "python.install")]
    Install {
        #[serde(flatten)]
        outcome: InstallOutcome,
    },
    #[serde(rename = "python.uninstall")]
    Uninstall {
        #[serde(flatten)]
        outcome: UninstallOutcome,
    },
    #[serde(rename = "python.tool")]
    Tool {
        #[serde(flatten)]
        outcome: ToolOutcome,
    },
}

pub fn run(args: PythonArgs, _global: &super::GlobalArgs) -> CmdResult<PythonOutput> {
    let remote = args.host.resolve()?;
    let exec = &remote.client;
    let settings = &remote.settings;

    let outcome = match args.command {
        PythonCommand::Install { version, force } => {
            let outcome = python::install(exec, settings, version.as_deref(), force)?;
            return Ok((PythonOutput::Install { outcome }, 0));
        }
        PythonCommand::Uninstall { version, yes } => {
            let outcome = python::uninstall(exec, settings, &version, |path| {
                crate::tty::confirm(&format!("Remove {} on {}?", path, remote.server_id), yes)
            })?;
            return Ok((PythonOutput::Uninstall { outcome }, 0));
        }
        PythonCommand::SetuptoolsInstall { py_version } => {
            python::install_setuptools(exec, settings, py_version.as_deref())?
        }
        PythonCommand::SetuptoolsUninstall { py_version } => {
            python::uninstall_setuptools(exec, settings, py_version.as_deref())?
        }
        PythonCommand::PipInstall { py_version } => {
            python::install_pip(exec, settings, py_version.as_deref())?
        }
        PythonCommand::PipUninstall { py_version } => {
            python::uninstall_pip(exec, settings, py_version.as_deref())?
        }
    };

    Ok((PythonOutput::Tool { outcome }, 0))
}

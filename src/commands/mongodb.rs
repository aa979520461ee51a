use clap::{Args, Subcommand};
use serde::Serialize;

use deckhand::mongodb::{self, DatadirOutcome, MongoInstallOutcome};

use super::{CmdResult, HostArgs};

#[derive(Args)]
pub struct MongodbArgs {
    #[command(flatten)]
    host: HostArgs,

    #[command(subcommand)]
    command: MongodbCommand,
}

#[derive(Subcommand)]
enum MongodbCommand {
    /// Add the vendor repository and install the server packages
    Install,
    /// Move the data directory and restart the service
    Datadir {
        /// Absolute path of the new data directory
        path: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum MongodbOutput {
    #[serde(rename = "mongodb.install")]
    Install {
        #[serde(flatten)]
        outcome: MongoInstallOutcome,
    },
    #[serde(rename = "mongodb.datadir")]
    Datadir {
        #[serde(flatten)]
        outcome: DatadirOutcome,
    },
}

pub fn run(args: MongodbArgs, _global: &super::GlobalArgs) -> CmdResult<MongodbOutput> {
    let remote = args.host.resolve()?;

    let output = match args.command {
        MongodbCommand::Install => MongodbOutput::Install {
            outcome: mongodb::install(&remote.client, &remote.settings)?,
        },
        MongodbCommand::Datadir { path } => MongodbOutput::Datadir {
            outcome: mongodb::change_datadir(&remote.client, &remote.settings, &path)?,
        },
    };

    Ok((output, 0))
}

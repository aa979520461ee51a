use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use deckhand::system::crontab;

use super::{CmdResult, HostArgs};

/// Install a local cron file as a user's crontab
#[derive(Args)]
pub struct CrontabArgs {
    #[command(flatten)]
    host: HostArgs,

    /// Local crontab file
    file: PathBuf,

    /// Remote user owning the crontab
    #[arg(long, short = 'u')]
    user: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrontabOutput {
    command: &'static str,
    server_id: String,
    user: String,
    file: String,
}

pub fn run(args: CrontabArgs, _global: &super::GlobalArgs) -> CmdResult<CrontabOutput> {
    let remote = args.host.resolve()?;
    crontab::install(&remote.client, &args.file, &args.user)?;

    Ok((
        CrontabOutput {
            command: "crontab.install",
            server_id: remote.server_id,
            user: args.user,
            file: args.file.display().to_string(),
        },
        0,
    ))
}

use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use deckhand::cloud::{self, AwsCli, SyncOutcome};
use deckhand::defaults;

use super::CmdResult;

/// Upload a local directory to a bucket, skipping files whose content is unchanged
#[derive(Args)]
pub struct S3Args {
    /// Bucket name
    bucket: String,

    /// Local directory to upload
    dir: PathBuf,

    /// Key prefix inside the bucket
    #[arg(long)]
    prefix: Option<String>,

    /// Canned ACL for uploaded objects (default: cloud.s3_acl)
    #[arg(long)]
    acl: Option<String>,
}

#[derive(Serialize)]
pub struct S3Output {
    command: &'static str,
    #[serde(flatten)]
    outcome: SyncOutcome,
}

pub fn run(args: S3Args, _global: &super::GlobalArgs) -> CmdResult<S3Output> {
    let settings = defaults::load_settings()?.cloud;
    let store = AwsCli::from_settings(&settings);
    let acl = args.acl.unwrap_or_else(|| settings.s3_acl.clone());

    let outcome = cloud::sync_dir_up(&store, &args.bucket, &args.dir, args.prefix.as_deref(), &acl)?;

    Ok((
        S3Output {
            command: "s3.sync",
            outcome,
        },
        0,
    ))
}

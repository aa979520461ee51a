use clap::{Args, Subcommand};
use serde::Serialize;

use deckhand::context::{self, RemoteProjectContext};
use deckhand::git::GitRepository;
use deckhand::release::{
    self, ActivateOutcome, CleanupOutcome, DeployOutcome, ReleaseId, ReleaseListing, UploadOutcome,
};

use super::CmdResult;

#[derive(Args)]
pub struct ReleaseArgs {
    #[command(subcommand)]
    command: ReleaseCommand,
}

#[derive(Subcommand)]
enum ReleaseCommand {
    /// Create the releases and virtualenv directories
    Init {
        /// Project ID
        project_id: String,
    },
    /// Archive a revision and unpack it as a new release
    Upload {
        /// Project ID
        project_id: String,
        /// Tag, branch or commit (default: deploy.default_revision)
        revision: Option<String>,
    },
    /// Point the live symlink at a release
    Activate {
        /// Project ID
        project_id: String,
        /// Release ID (YYYYMMDD-HHMMSS-commit)
        release_id: String,
    },
    /// Remove old releases, keeping the newest and the live one
    Cleanup {
        /// Project ID
        project_id: String,
        /// Releases to keep (default: deploy.keep_releases)
        #[arg(long)]
        keep: Option<usize>,
    },
    /// List releases on the server
    List {
        /// Project ID
        project_id: String,
    },
    /// Show the live release
    Current {
        /// Project ID
        project_id: String,
    },
    /// Upload, activate, clean up and restart the project service
    Deploy {
        /// Project ID
        project_id: String,
        /// Tag, branch or commit (default: deploy.default_revision)
        revision: Option<String>,
    },
    /// Remove a deploy lock left behind by an interrupted run
    Unlock {
        /// Project ID
        project_id: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum ReleaseOutput {
    #[serde(rename = "release.init")]
    Init { project: String, created: Vec<String> },
    #[serde(rename = "release.upload")]
    Upload {
        project: String,
        #[serde(flatten)]
        outcome: UploadOutcome,
    },
    #[serde(rename = "release.activate")]
    Activate {
        project: String,
        #[serde(flatten)]
        outcome: ActivateOutcome,
    },
    #[serde(rename = "release.cleanup")]
    Cleanup {
        project: String,
        #[serde(flatten)]
        outcome: CleanupOutcome,
    },
    #[serde(rename = "release.list")]
    List {
        #[serde(flatten)]
        listing: ReleaseListing,
    },
    #[serde(rename = "release.current")]
    Current {
        project: String,
        active: Option<ReleaseId>,
    },
    #[serde(rename = "release.deploy")]
    Deploy {
        project: String,
        #[serde(flatten)]
        outcome: DeployOutcome,
    },
    #[serde(rename = "release.unlock")]
    Unlock {
        project: String,
        #[serde(rename = "lockPath")]
        lock_path: String,
        removed: bool,
    },
}

pub fn run(args: ReleaseArgs, _global: &super::GlobalArgs) -> CmdResult<ReleaseOutput> {
    match args.command {
        ReleaseCommand::Init { project_id } => {
            let remote = context::resolve_project_ssh(&project_id)?;
            let created = release::create_project_structure(&remote.deploy_context())?;
            Ok((
                ReleaseOutput::Init {
                    project: project_id,
                    created,
                },
                0,
            ))
        }
        ReleaseCommand::Upload {
            project_id,
            revision,
        } => {
            let remote = context::resolve_project_ssh(&project_id)?;
            let repo = source_repository(&remote)?;
            let outcome = release::upload(&remote.deploy_context(), &repo, revision.as_deref())?;
            Ok((
                ReleaseOutput::Upload {
                    project: project_id,
                    outcome,
                },
                0,
            ))
        }
        ReleaseCommand::Activate {
            project_id,
            release_id,
        } => {
            let remote = context::resolve_project_ssh(&project_id)?;
            let outcome = release::activate(&remote.deploy_context(), &release_id)?;
            Ok((
                ReleaseOutput::Activate {
                    project: project_id,
                    outcome,
                },
                0,
            ))
        }
        ReleaseCommand::Cleanup { project_id, keep } => {
            let remote = context::resolve_project_ssh(&project_id)?;
            let outcome = release::cleanup(&remote.deploy_context(), keep)?;
            Ok((
                ReleaseOutput::Cleanup {
                    project: project_id,
                    outcome,
                },
                0,
            ))
        }
        ReleaseCommand::List { project_id } => {
            let remote = context::resolve_project_ssh(&project_id)?;
            let listing = release::list(&remote.deploy_context())?;
            Ok((ReleaseOutput::List { listing }, 0))
        }
        ReleaseCommand::Current { project_id } => {
            let remote = context::resolve_project_ssh(&project_id)?;
            let active = release::current(&remote.deploy_context())?;
            Ok((
                ReleaseOutput::Current {
                    project: project_id,
                    active,
                },
                0,
            ))
        }
        ReleaseCommand::Deploy {
            project_id,
            revision,
        } => {
            let remote = context::resolve_project_ssh(&project_id)?;
            let repo = source_repository(&remote)?;
            let outcome = release::deploy(&remote.deploy_context(), &repo, revision.as_deref())?;
            Ok((
                ReleaseOutput::Deploy {
                    project: project_id,
                    outcome,
                },
                0,
            ))
        }
        ReleaseCommand::Unlock { project_id } => {
            let remote = context::resolve_project_ssh(&project_id)?;
            let ctx = remote.deploy_context();
            let removed = release::unlock(&ctx)?;
            Ok((
                ReleaseOutput::Unlock {
                    project: project_id,
                    lock_path: ctx.lock_dir(),
                    removed,
                },
                0,
            ))
        }
    }
}

fn source_repository(remote: &RemoteProjectContext) -> deckhand::Result<GitRepository> {
    let source_dir = remote
        .project
        .source_dir
        .as_deref()
        .filter(|dir| !dir.trim().is_empty())
        .ok_or_else(|| {
            deckhand::Error::config_missing_key(
                "project.sourceDir",
                Some(remote.project.id.clone()),
            )
            .with_hint(format!(
                "Set it with: deckhand project set {} --sourceDir <path>",
                remote.project.id
            ))
        })?;

    GitRepository::open(source_dir)
}

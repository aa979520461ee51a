use clap::{Args, Subcommand};
use serde::Serialize;

use deckhand::project::{self, CreateFromFlags, Project};
use deckhand::{BatchResult, CreateOutput, MergeOutput};

use super::{CmdResult, DynamicSetArgs};

#[derive(Args)]
pub struct ProjectArgs {
    #[command(subcommand)]
    command: ProjectCommand,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// List all configured projects
    List,
    /// Show project configuration
    Show {
        /// Project ID
        project_id: String,
    },
    /// Create a new project
    Create {
        /// JSON input spec (supports single or bulk)
        #[arg(long)]
        json: Option<String>,

        /// Skip items that already exist (JSON mode only)
        #[arg(long)]
        skip_existing: bool,

        /// Project ID (CLI mode); also the remote directory name
        id: Option<String>,
        /// Server the project deploys to
        #[arg(long)]
        server_id: Option<String>,
        /// Remote root the project directory lives under
        #[arg(long)]
        install_root: Option<String>,
        /// Local git checkout releases are archived from
        #[arg(long)]
        source_dir: Option<String>,
        /// Python version the project runs on
        #[arg(long)]
        python_version: Option<String>,
        /// Upstart job restarted after deploy
        #[arg(long)]
        service: Option<String>,
        /// Remote owner for uploaded releases (user or user:group)
        #[arg(long)]
        owner: Option<String>,
    },
    /// Update project configuration fields
    #[command(visible_aliases = ["edit", "merge"])]
    Set {
        #[command(flatten)]
        args: DynamicSetArgs,
    },
    /// Point a project at a different server
    SetServer {
        /// Project ID
        project_id: String,
        /// Server ID
        server_id: String,
    },
    /// Delete a project configuration
    Delete {
        /// Project ID
        project_id: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListItem {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum ProjectOutput {
    #[serde(rename = "project.list")]
    List { projects: Vec<ProjectListItem> },
    #[serde(rename = "project.show")]
    Show {
        id: String,
        project: Project,
        #[serde(rename = "deployReady")]
        deploy_ready: bool,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        missing: Vec<String>,
    },
    #[serde(rename = "project.create")]
    Create { id: String, project: Project },
    #[serde(rename = "project.create_bulk")]
    CreateBatch { batch: BatchResult },
    #[serde(rename = "project.set")]
    Set { result: MergeOutput },
    #[serde(rename = "project.set_server")]
    SetServer { id: String, project: Project },
    #[serde(rename = "project.delete")]
    Delete { id: String },
}

pub fn run(args: ProjectArgs, _global: &super::GlobalArgs) -> CmdResult<ProjectOutput> {
    match args.command {
        ProjectCommand::List => list(),
        ProjectCommand::Show { project_id } => show(&project_id),
        ProjectCommand::Create {
            json,
            skip_existing,
            id,
            server_id,
            install_root,
            source_dir,
            python_version,
            service,
            owner,
        } => {
            if let Some(spec) = json {
                return match project::create(&super::read_spec(&spec)?, skip_existing)? {
                    CreateOutput::Single(result) => Ok((
                        ProjectOutput::Create {
                            id: result.id,
                            project: result.entity,
                        },
                        0,
                    )),
                    CreateOutput::Bulk(batch) => {
                        let exit_code = i32::from(batch.has_errors());
                        Ok((ProjectOutput::CreateBatch { batch }, exit_code))
                    }
                };
            }

            let id = id.ok_or_else(|| {
                deckhand::Error::validation_invalid_argument(
                    "id",
                    "Missing required argument: id (or use --json)",
                    None,
                    None,
                )
            })?;

            let created = project::create_from_flags(CreateFromFlags {
                id,
                server_id,
                install_root,
                source_dir,
                python_version,
                service,
                owner,
            })?;

            Ok((
                ProjectOutput::Create {
                    id: created.id.clone(),
                    project: created,
                },
                0,
            ))
        }
        ProjectCommand::Set { args } => set(args),
        ProjectCommand::SetServer {
            project_id,
            server_id,
        } => {
            let project = project::set_server(&project_id, &server_id)?;
            Ok((
                ProjectOutput::SetServer {
                    id: project_id,
                    project,
                },
                0,
            ))
        }
        ProjectCommand::Delete { project_id } => {
            project::delete(&project_id)?;
            Ok((ProjectOutput::Delete { id: project_id }, 0))
        }
    }
}

fn list() -> CmdResult<ProjectOutput> {
    let projects = project::list()?
        .into_iter()
        .map(|p| ProjectListItem {
            id: p.id,
            server_id: p.server_id,
            service: p.service,
        })
        .collect();

    Ok((ProjectOutput::List { projects }, 0))
}

fn show(project_id: &str) -> CmdResult<ProjectOutput> {
    let project = project::load(project_id)?;
    let missing = deploy_missing(&project);

    Ok((
        ProjectOutput::Show {
            id: project_id.to_string(),
            deploy_ready: missing.is_empty(),
            missing,
            project,
        },
        0,
    ))
}

/// Fields a `release deploy` needs that the project does not set.
fn deploy_missing(project: &Project) -> Vec<String> {
    let mut missing = Vec::new();
    if project.server_id.as_deref().is_none_or(str::is_empty) {
        missing.push("serverId".to_string());
    }
    if project.source_dir.as_deref().is_none_or(str::is_empty) {
        missing.push("sourceDir".to_string());
    }
    missing
}

fn set(args: DynamicSetArgs) -> CmdResult<ProjectOutput> {
    let json = args.to_json_string()?;
    let result = project::merge(args.id.as_deref(), &json)?;
    let exit_code = match &result {
        MergeOutput::Bulk(batch) if batch.has_errors() => 1,
        _ => 0,
    };
    Ok((ProjectOutput::Set { result }, exit_code))
}

use clap::{Args, Subcommand};
use serde::Serialize;

use deckhand::server::{self, Server, ServerChanges};
use deckhand::{BatchResult, CreateOutput, MergeOutput};

use super::{CmdResult, DynamicSetArgs};

#[derive(Args)]
pub struct ServerArgs {
    #[command(subcommand)]
    command: ServerCommand,
}

#[derive(Subcommand)]
enum ServerCommand {
    /// Register a server from flags or a JSON spec
    Create {
        /// JSON spec, @file or - for stdin; an array creates several servers
        #[arg(long)]
        json: Option<String>,
        /// With --json, leave existing servers alone instead of failing
        #[arg(long)]
        skip_existing: bool,

        /// Server ID (derived from the host when omitted)
        id: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 22)]
        port: u16,
        /// Private key passed to ssh -i
        #[arg(long)]
        identity_file: Option<String>,
    },
    /// Show a server by ID or host name
    Show { server: String },
    /// Merge JSON or --key value flags into a server
    #[command(visible_aliases = ["edit", "merge"])]
    Set {
        #[command(flatten)]
        args: DynamicSetArgs,
    },
    /// Change connection fields
    Update {
        server_id: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Empty string clears the identity file
        #[arg(long)]
        identity_file: Option<String>,
    },
    /// Remove a server no project uses
    Delete { server_id: String },
    List,
}

#[derive(Serialize)]
#[serde(tag = "command", rename_all_fields = "camelCase")]
pub enum ServerOutput {
    #[serde(rename = "server.create")]
    Create { server_id: String, server: Server },
    #[serde(rename = "server.create_bulk")]
    CreateBatch { batch: BatchResult },
    #[serde(rename = "server.show")]
    Show { server_id: String, server: Server },
    #[serde(rename = "server.set")]
    Set { result: MergeOutput },
    #[serde(rename = "server.update")]
    Update {
        server_id: String,
        server: Server,
        updated: Vec<String>,
    },
    #[serde(rename = "server.delete")]
    Delete { server_id: String },
    #[serde(rename = "server.list")]
    List { servers: Vec<Server> },
}

pub fn run(args: ServerArgs, _global: &super::GlobalArgs) -> CmdResult<ServerOutput> {
    let output = match args.command {
        ServerCommand::Create {
            json: Some(spec),
            skip_existing,
            ..
        } => match server::create(&super::read_spec(&spec)?, skip_existing)? {
            CreateOutput::Single(created) => ServerOutput::Create {
                server_id: created.id,
                server: created.entity,
            },
            CreateOutput::Bulk(batch) => {
                let exit_code = i32::from(batch.has_errors());
                return Ok((ServerOutput::CreateBatch { batch }, exit_code));
            }
        },
        ServerCommand::Create {
            json: None,
            id,
            host,
            user,
            port,
            identity_file,
            ..
        } => {
            let host = required(host, "host", "--host (or use --json)")?;
            let user = required(user, "user", "--user")?;
            let server = server::create_from_flags(id, &host, &user, port, identity_file)?;
            ServerOutput::Create {
                server_id: server.id.clone(),
                server,
            }
        }
        ServerCommand::Show { server: key } => {
            let server = server::load(&key)
                .or_else(|not_found| server::find_by_host(&key).ok_or(not_found))?;
            ServerOutput::Show {
                server_id: server.id.clone(),
                server,
            }
        }
        ServerCommand::Set { args } => {
            let result = server::merge(args.id.as_deref(), &args.to_json_string()?)?;
            let exit_code = match &result {
                MergeOutput::Bulk(batch) => i32::from(batch.has_errors()),
                MergeOutput::Single(_) => 0,
            };
            return Ok((ServerOutput::Set { result }, exit_code));
        }
        ServerCommand::Update {
            server_id,
            host,
            user,
            port,
            identity_file,
        } => {
            let changes = ServerChanges {
                host,
                user,
                port,
                identity_file,
            };
            let result = server::update(&server_id, changes)?;
            ServerOutput::Update {
                server_id: result.id,
                server: result.server,
                updated: result.updated_fields,
            }
        }
        ServerCommand::Delete { server_id } => {
            server::delete_safe(&server_id)?;
            ServerOutput::Delete { server_id }
        }
        ServerCommand::List => ServerOutput::List {
            servers: server::list()?,
        },
    };

    Ok((output, 0))
}

fn required(value: Option<String>, field: &str, flag: &str) -> deckhand::Result<String> {
    value.ok_or_else(|| {
        deckhand::Error::validation_invalid_argument(
            field,
            format!("Missing required argument: {}", flag),
            None,
            None,
        )
    })
}

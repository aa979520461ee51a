use clap::Args;
use serde::Serialize;

use deckhand::context::{self, DeployContext};
use deckhand::executor::Executor;
use deckhand::project;
use deckhand::server;
use deckhand::shell;
use deckhand::ssh::SshClient;

use super::CmdResult;

#[derive(Args)]
pub struct SshArgs {
    /// Target ID (project or server; project wins when ambiguous)
    pub target: String,

    /// Command to execute (omit for an interactive shell).
    ///
    /// Examples:
    ///   deckhand ssh shop -- ls -la releases
    ///   deckhand ssh shop "tail -n 50 /var/log/upstart/shop.log"
    ///
    /// Shell operators (&&, |, redirects) need a single quoted string.
    #[arg(num_args = 0.., trailing_var_arg = true)]
    pub command: Vec<String>,

    /// Force interpretation as server ID
    #[arg(long)]
    pub as_server: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshOutput {
    pub command: &'static str,
    pub resolved_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub server_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub success: bool,
    /// The target is this machine, so nothing went over ssh.
    pub local: bool,
}

struct Resolved {
    project_id: Option<String>,
    server_id: String,
    client: SshClient,
    /// Directory the session starts in.
    workdir: Option<String>,
}

fn resolve(target: &str, as_server: bool) -> deckhand::Result<Resolved> {
    if !as_server && project::exists(target) {
        let remote = context::resolve_project_ssh(target)?;
        let workdir = DeployContext::new(
            remote.project.clone(),
            remote.settings.clone(),
            &remote.client,
        )
        .project_dir();

        return Ok(Resolved {
            project_id: Some(remote.project.id),
            server_id: remote.server_id,
            client: remote.client,
            workdir: Some(workdir),
        });
    }

    let svr = server::load(target)?;
    let client = SshClient::from_server(&svr, target)?;
    Ok(Resolved {
        project_id: None,
        server_id: target.to_string(),
        client,
        workdir: None,
    })
}

/// A single argument is a raw shell line; several are quoted individually.
fn command_line(args: &[String]) -> Option<String> {
    match args {
        [] => None,
        [single] => Some(single.clone()),
        many => Some(shell::quote_args(many)),
    }
}

fn with_workdir(workdir: Option<&str>, command: Option<&str>) -> Option<String> {
    match (workdir, command) {
        (Some(dir), Some(cmd)) => Some(format!("cd {} && {}", shell::quote_path(dir), cmd)),
        (Some(dir), None) => Some(format!("cd {} && exec $SHELL -l", shell::quote_path(dir))),
        (None, cmd) => cmd.map(str::to_string),
    }
}

pub fn run(args: SshArgs, _global: &super::GlobalArgs) -> CmdResult<SshOutput> {
    let resolved = resolve(&args.target, args.as_server)?;
    let command = command_line(&args.command);
    let effective = with_workdir(resolved.workdir.as_deref(), command.as_deref());

    let local = resolved.client.is_local();
    let resolved_type = if resolved.project_id.is_some() {
        "project"
    } else {
        "server"
    };

    match effective.as_deref().filter(|_| command.is_some()) {
        Some(line) => {
            let output = resolved.client.execute(line);
            Ok((
                SshOutput {
                    command: "ssh.exec",
                    resolved_type,
                    project_id: resolved.project_id,
                    server_id: resolved.server_id,
                    remote_command: command,
                    stdout: Some(output.stdout),
                    stderr: Some(output.stderr),
                    success: output.success,
                    local,
                },
                output.exit_code,
            ))
        }
        None => {
            let exit_code = resolved.client.execute_interactive(effective.as_deref());
            Ok((
                SshOutput {
                    command: "ssh.session",
                    resolved_type,
                    project_id: resolved.project_id,
                    server_id: resolved.server_id,
                    remote_command: None,
                    stdout: None,
                    stderr: None,
                    success: exit_code == 0,
                    local,
                },
                exit_code,
            ))
        }
    }
}

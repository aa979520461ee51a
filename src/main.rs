use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::GlobalArgs;

#[derive(Debug, Clone, Copy)]
enum ResponseMode {
    Json,
    InteractivePassthrough,
}

mod commands;
mod output;
mod tty;

use commands::{
    cloud, config, crontab, mongodb, nginx, project, python, release, s3, server, ssh, system,
    upstart,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(version = VERSION)]
#[command(about = "Deploy Python web applications to Linux servers over SSH")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage project configuration
    #[command(visible_alias = "projects")]
    Project(project::ProjectArgs),
    /// Manage SSH server configurations
    Server(server::ServerArgs),
    /// Upload, activate and prune releases
    Release(release::ReleaseArgs),
    /// Build and configure nginx
    Nginx(nginx::NginxArgs),
    /// Build Python interpreters, setuptools and pip
    Python(python::PythonArgs),
    /// Install MongoDB and move its data directory
    Mongodb(mongodb::MongodbArgs),
    /// Apt sources, services and reboot
    System(system::SystemArgs),
    /// Manage upstart jobs
    Upstart(upstart::UpstartArgs),
    /// Install crontabs
    Crontab(crontab::CrontabArgs),
    /// Machine images and autoscaling groups
    Cloud(cloud::CloudArgs),
    /// Sync static files to object storage
    S3(s3::S3Args),
    /// Manage global settings (deckhand.json)
    Config(config::ConfigArgs),
    /// SSH into a project server or configured server
    Ssh(ssh::SshArgs),
}

/// `deckhand ssh <target>` without a command hands the terminal to ssh;
/// everything else prints a JSON envelope.
fn response_mode(command: &Commands) -> ResponseMode {
    match command {
        Commands::Ssh(args) if args.command.is_empty() => ResponseMode::InteractivePassthrough,
        _ => ResponseMode::Json,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};
    let mode = response_mode(&cli.command);

    if matches!(mode, ResponseMode::InteractivePassthrough) && !tty::is_interactive() {
        output::print_result(Err(deckhand::Error::validation_invalid_argument(
            "tty",
            "This command requires an interactive TTY",
            None,
            None,
        )));
        return exit_code(2);
    }

    let (result, code) = commands::run_json(cli.command, &global);
    match (mode, result) {
        (ResponseMode::Json, result) => output::print_result(result),
        // The session already used the terminal; only a failure to start it is printed.
        (ResponseMode::InteractivePassthrough, Err(err)) => output::print_result(Err(err)),
        (ResponseMode::InteractivePassthrough, Ok(_)) => {}
    }

    exit_code(code)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

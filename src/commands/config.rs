use clap::{Args, Subcommand};
use serde::Serialize;

use deckhand::defaults::{self, Settings};

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Effective settings: built-in defaults overlaid with deckhand.json
    Show {
        /// Ignore deckhand.json
        #[arg(long)]
        builtin: bool,
    },
    /// Merge a JSON patch into deckhand.json
    Set {
        /// Patch such as '{"nginx": {"version": "1.4.1"}}', @file or -
        spec: Option<String>,
        /// Same as the positional patch; wins when both are given
        #[arg(long, value_name = "JSON")]
        json: Option<String>,
    },
    /// Delete deckhand.json and go back to built-in defaults
    Reset,
    /// Where deckhand.json lives
    Path,
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum ConfigOutput {
    #[serde(rename = "config.show")]
    Show { builtin: bool, settings: Settings },
    #[serde(rename = "config.set")]
    Set {
        path: String,
        updated: Vec<String>,
        settings: Settings,
    },
    #[serde(rename = "config.reset")]
    Reset { path: String, deleted: bool },
    #[serde(rename = "config.path")]
    Path { path: String, exists: bool },
}

pub fn run(args: ConfigArgs, _global: &super::GlobalArgs) -> CmdResult<ConfigOutput> {
    let output = match args.command {
        ConfigCommand::Show { builtin } => ConfigOutput::Show {
            builtin,
            settings: if builtin {
                Settings::default()
            } else {
                defaults::load_settings()?
            },
        },
        ConfigCommand::Set { spec, json } => {
            let spec = json.or(spec).ok_or_else(|| {
                deckhand::Error::validation_invalid_argument(
                    "spec",
                    "Provide a JSON patch or --json",
                    None,
                    None,
                )
            })?;
            let patch = super::merge_json_sources(Some(&spec), &[])?;
            if !patch.is_object() {
                return Err(deckhand::Error::validation_invalid_argument(
                    "spec",
                    "Settings patch must be a JSON object",
                    None,
                    None,
                ));
            }

            let (settings, updated) = defaults::merge_settings(patch)?;
            ConfigOutput::Set {
                path: defaults::settings_path()?,
                updated,
                settings,
            }
        }
        ConfigCommand::Reset => ConfigOutput::Reset {
            deleted: defaults::reset_settings()?,
            path: defaults::settings_path()?,
        },
        ConfigCommand::Path => {
            let path = defaults::settings_path()?;
            ConfigOutput::Path {
                exists: std::path::Path::new(&path).is_file(),
                path,
            }
        }
    };

    Ok((output, 0))
}

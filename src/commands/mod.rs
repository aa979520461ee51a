use clap::Args;
use serde_json::{Map, Value};
use std::io::{IsTerminal, Read};

use deckhand::context::{self, RemoteHostContext};

pub type CmdResult<T> = deckhand::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Target host for host-level commands: a server directly, or a project's server.
#[derive(Args, Debug, Clone, Default)]
pub struct HostArgs {
    /// Server ID to run on
    #[arg(long, conflicts_with = "project")]
    pub server: Option<String>,

    /// Run on the server of this project
    #[arg(long)]
    pub project: Option<String>,
}

impl HostArgs {
    pub fn resolve(&self) -> deckhand::Result<RemoteHostContext> {
        context::resolve_host(self.server.as_deref(), self.project.as_deref())
    }
}

/// `set` arguments: an optional ID, a JSON spec, and free-form `--key value`
/// pairs. Keys are used as JSON keys verbatim, so use the record's camelCase
/// names. Put `--` before the pairs when combining them with `--json`:
///
/// ```sh
/// deckhand project set shop --json '{"service":"shop"}' -- --pythonVersion 2.7.5
/// ```
#[derive(Args, Default, Debug)]
pub struct DynamicSetArgs {
    /// Record ID (or an "id" field in the JSON)
    pub id: Option<String>,

    /// JSON spec, @file or - for stdin
    pub spec: Option<String>,

    /// Same as the positional spec; wins when both are given
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,

    /// --key value pairs, e.g. --installRoot /srv
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,
}

impl DynamicSetArgs {
    pub fn json_spec(&self) -> Option<&str> {
        self.json.as_deref().or(self.spec.as_deref())
    }

    /// The spec with the `--key value` pairs laid over it, as JSON text.
    pub fn to_json_string(&self) -> deckhand::Result<String> {
        let spec = self.json_spec();
        if spec.is_none() && self.extra.is_empty() {
            return Err(deckhand::Error::validation_invalid_argument(
                "spec",
                "Provide a JSON spec, --json, or --key value flags",
                None,
                None,
            ));
        }

        Ok(merge_json_sources(spec, &self.extra)?.to_string())
    }
}

fn parse_kv_flags(extra: &[String]) -> deckhand::Result<Map<String, Value>> {
    let mut fields = Map::new();
    let mut args = extra.iter();

    while let Some(arg) = args.next() {
        let key = arg.strip_prefix("--").filter(|k| !k.is_empty()).ok_or_else(|| {
            deckhand::Error::validation_invalid_argument(
                "flags",
                format!("Expected --key before '{}'", arg),
                None,
                None,
            )
        })?;
        let value = args.next().ok_or_else(|| {
            deckhand::Error::validation_invalid_argument(
                key,
                format!("Missing value for flag --{}", key),
                None,
                None,
            )
        })?;
        fields.insert(key.to_string(), parse_value(value));
    }

    Ok(fields)
}

/// Anything that parses as JSON (numbers, booleans, arrays) keeps its type;
/// everything else is a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Resolve a JSON spec argument: inline text, `@path` for a file, or `-` for stdin.
pub(crate) fn read_spec(spec: &str) -> deckhand::Result<String> {
    match spec.trim() {
        "-" => {
            let mut stdin = std::io::stdin();
            if stdin.is_terminal() {
                return Err(deckhand::Error::validation_invalid_argument(
                    "json",
                    "Refusing to read JSON from an interactive stdin",
                    None,
                    None,
                ));
            }
            let mut buf = String::new();
            stdin.read_to_string(&mut buf).map_err(|e| {
                deckhand::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
            })?;
            Ok(buf)
        }
        "@" => Err(deckhand::Error::validation_invalid_argument(
            "json",
            "'@' needs a file path",
            None,
            None,
        )),
        trimmed => match trimmed.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                deckhand::Error::internal_io(e.to_string(), Some(format!("read {}", path)))
            }),
            None => Ok(spec.to_string()),
        },
    }
}

/// Parse the spec (if any) and lay the `--key value` pairs over it.
pub fn merge_json_sources(spec: Option<&str>, extra: &[String]) -> deckhand::Result<Value> {
    let mut merged = match spec {
        Some(spec) => serde_json::from_str(&read_spec(spec)?).map_err(|e| {
            deckhand::Error::validation_invalid_json(e, Some("parse JSON spec".to_string()))
        })?,
        None => Value::Object(Map::new()),
    };

    let flags = parse_kv_flags(extra)?;
    if !flags.is_empty() {
        let Value::Object(fields) = &mut merged else {
            return Err(deckhand::Error::validation_invalid_argument(
                "spec",
                "--key value flags need an object spec",
                None,
                None,
            ));
        };
        fields.extend(flags);
    }

    Ok(merged)
}

pub mod cloud;
pub mod config;
pub mod crontab;
pub mod mongodb;
pub mod nginx;
pub mod project;
pub mod python;
pub mod release;
pub mod s3;
pub mod server;
pub mod ssh;
pub mod system;
pub mod upstart;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (deckhand::Result<serde_json::Value>, i32) {
    crate::tty::status("deckhand is working...");

    match command {
        crate::Commands::Project(args) => dispatch!(args, global, project),
        crate::Commands::Server(args) => dispatch!(args, global, server),
        crate::Commands::Release(args) => dispatch!(args, global, release),
        crate::Commands::Nginx(args) => dispatch!(args, global, nginx),
        crate::Commands::Python(args) => dispatch!(args, global, python),
        crate::Commands::Mongodb(args) => dispatch!(args, global, mongodb),
        crate::Commands::System(args) => dispatch!(args, global, system),
        crate::Commands::Upstart(args) => dispatch!(args, global, upstart),
        crate::Commands::Crontab(args) => dispatch!(args, global, crontab),
        crate::Commands::Cloud(args) => dispatch!(args, global, cloud),
        crate::Commands::S3(args) => dispatch!(args, global, s3),
        crate::Commands::Config(args) => dispatch!(args, global, config),
        crate::Commands::Ssh(args) => dispatch!(args, global, ssh),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_override_spec_values() {
        let merged = merge_json_sources(
            Some(r#"{"service": "shop", "keepReleases": 3}"#),
            &["--keepReleases".to_string(), "7".to_string()],
        )
        .unwrap();
        assert_eq!(merged["service"], "shop");
        assert_eq!(merged["keepReleases"], 7);
    }

    #[test]
    fn flag_without_value_is_rejected() {
        assert!(parse_kv_flags(&["--owner".to_string()]).is_err());
        assert!(parse_kv_flags(&["owner".to_string(), "www".to_string()]).is_err());
    }

    #[test]
    fn spec_can_come_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.json");
        std::fs::write(&path, r#"{"serverId": "web1"}"#).unwrap();

        let raw = read_spec(&format!("@{}", path.display())).unwrap();
        assert_eq!(raw, r#"{"serverId": "web1"}"#);
        assert!(read_spec("@").is_err());
        assert_eq!(read_spec(r#"{"a": 1}"#).unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn values_are_typed() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("12"), json!(12));
        assert_eq!(parse_value("/srv/apps"), json!("/srv/apps"));
        assert_eq!(parse_value(r#"["a","b"]"#), json!(["a", "b"]));
    }
}

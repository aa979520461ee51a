//! Structured errors: a stable dotted code, a message, JSON details for
//! machine consumers and optional hints for people.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

macro_rules! error_codes {
    ($($variant:ident => $code:literal,)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorCode {
            $($variant,)+
        }

        impl ErrorCode {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $code,)+
                }
            }
        }
    };
}

error_codes! {
    ConfigMissingKey => "config.missing_key",
    ConfigInvalidJson => "config.invalid_json",
    ConfigInvalidValue => "config.invalid_value",
    ConfigIdCollision => "config.id_collision",
    ValidationMissingArgument => "validation.missing_argument",
    ValidationInvalidArgument => "validation.invalid_argument",
    ValidationInvalidJson => "validation.invalid_json",
    ProjectNotFound => "project.not_found",
    ServerNotFound => "server.not_found",
    ResourceNotFound => "resource.not_found",
    ReleaseNotFound => "release.not_found",
    ReleaseInvalidId => "release.invalid_id",
    SshServerInvalid => "ssh.server_invalid",
    SshIdentityFileNotFound => "ssh.identity_file_not_found",
    RemoteCommandFailed => "remote.command_failed",
    DeployLocked => "deploy.locked",
    GitRevisionNotFound => "git.revision_not_found",
    GitCommandFailed => "git.command_failed",
    CloudCommandFailed => "cloud.command_failed",
    CloudImageFailed => "cloud.image_failed",
    CloudTimeout => "cloud.timeout",
    InternalIoError => "internal.io_error",
    InternalJsonError => "internal.json_error",
    InternalUnexpected => "internal.unexpected",
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for Error {}

/// A remote command that exited non-zero, with everything it printed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub target: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCommandFailedDetails {
    pub operation: String,
    pub exit_code: i32,
    pub stderr: String,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| json!({}))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    // Input

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let message = format!("Missing required argument: {}", args.join(", "));
        Self::new(ErrorCode::ValidationMissingArgument, message, json!({ "args": args }))
    }

    /// `id` names the record involved, `tried` lists values that were considered.
    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let mut details = json!({ "field": field.into(), "problem": problem });
        if let Some(id) = id {
            details["id"] = json!(id);
        }
        if let Some(tried) = tried {
            details["tried"] = json!(tried);
        }
        Self::new(ErrorCode::ValidationInvalidArgument, problem, details)
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidJson,
            format!("Invalid JSON: {}", err),
            json!({ "error": err.to_string(), "context": context }),
        )
    }

    // Lookups

    fn not_found(code: ErrorCode, message: String, id: String, suggestions: Vec<String>) -> Self {
        let mut details = json!({ "id": id });
        if !suggestions.is_empty() {
            details["suggestions"] = json!(suggestions);
        }
        Self::new(code, message, details)
    }

    pub fn project_not_found(id: impl Into<String>, suggestions: Vec<String>) -> Self {
        let id = id.into();
        Self::not_found(ErrorCode::ProjectNotFound, format!("Project '{}' not found", id), id, suggestions)
            .with_hint("Run 'deckhand project list' to see configured projects")
    }

    pub fn server_not_found(id: impl Into<String>, suggestions: Vec<String>) -> Self {
        let id = id.into();
        Self::not_found(ErrorCode::ServerNotFound, format!("Server '{}' not found", id), id, suggestions)
            .with_hint("Run 'deckhand server list' to see configured servers")
    }

    pub fn resource_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::not_found(ErrorCode::ResourceNotFound, format!("File {} not found", path), path, Vec::new())
    }

    /// `available` lists the releases that do exist.
    pub fn release_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::not_found(ErrorCode::ReleaseNotFound, format!("Release {} not found", id), id, available)
            .with_hint("Run 'deckhand release list <project>' to see uploaded releases")
    }

    pub fn release_invalid_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ReleaseInvalidId,
            format!("'{}' is not a release identifier", id),
            json!({ "id": id, "expected": "YYYYMMDD-HHMMSS-<8 hex chars>" }),
        )
    }

    // Hosts

    pub fn ssh_server_invalid(server_id: impl Into<String>, missing_fields: Vec<String>) -> Self {
        let server_id = server_id.into();
        Self::new(
            ErrorCode::SshServerInvalid,
            format!("Server '{}' is missing {}", server_id, missing_fields.join(" and ")),
            json!({ "serverId": server_id, "missingFields": missing_fields }),
        )
    }

    pub fn ssh_identity_file_not_found(
        server_id: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        let identity_file = identity_file.into();
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            format!("SSH identity file {} does not exist", identity_file),
            json!({ "serverId": server_id.into(), "identityFile": identity_file }),
        )
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let message = format!(
            "Remote command failed with exit code {}: {}",
            details.exit_code, details.command
        );
        Self::new(ErrorCode::RemoteCommandFailed, message, to_details(details))
    }

    pub fn deploy_locked(project_id: &str, lock_path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeployLocked,
            format!("Another deployment of '{}' holds the project lock", project_id),
            json!({ "projectId": project_id, "lockPath": lock_path.into() }),
        )
        .with_hint("Wait for the other operator to finish")
        .with_hint(format!(
            "If an interrupted run left it behind: deckhand release unlock {}",
            project_id
        ))
        .retryable(true)
    }

    // Local git

    pub fn git_revision_not_found(revision: impl Into<String>, stderr: impl Into<String>) -> Self {
        let revision = revision.into();
        Self::new(
            ErrorCode::GitRevisionNotFound,
            format!("Revision '{}' does not resolve to a commit", revision),
            json!({ "revision": revision, "stderr": stderr.into() }),
        )
    }

    pub fn git_command_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::GitCommandFailed, message, json!({}))
    }

    // Cloud

    pub fn cloud_command_failed(details: CloudCommandFailedDetails) -> Self {
        let message = format!("Cloud operation '{}' failed", details.operation);
        Self::new(ErrorCode::CloudCommandFailed, message, to_details(details))
    }

    pub fn cloud_image_failed(image_id: impl Into<String>) -> Self {
        let image_id = image_id.into();
        Self::new(
            ErrorCode::CloudImageFailed,
            format!("Error creating machine image {}", image_id),
            json!({ "imageId": image_id }),
        )
    }

    pub fn cloud_timeout(image_id: impl Into<String>, attempts: u32) -> Self {
        let image_id = image_id.into();
        Self::new(
            ErrorCode::CloudTimeout,
            format!("Machine image {} was not available after {} polls", image_id, attempts),
            json!({ "imageId": image_id, "attempts": attempts }),
        )
        .retryable(true)
    }

    // Local configuration

    /// `path` is the record or file the key was expected in.
    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            json!({ "key": key, "path": path }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidJson,
            format!("Invalid JSON in {}", path),
            json!({ "path": path, "error": err.to_string() }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            problem.clone(),
            json!({ "key": key.into(), "value": value, "problem": problem }),
        )
    }

    /// The same ID is already used by a record of another kind.
    pub fn config_id_collision(
        id: impl Into<String>,
        requested_type: impl Into<String>,
        existing_type: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let existing = existing_type.into();
        Self::new(
            ErrorCode::ConfigIdCollision,
            format!("ID '{}' is already used by a {}", id, existing),
            json!({ "id": id, "requestedType": requested_type.into(), "existingType": existing }),
        )
    }

    // Internal

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(context) => format!("Failed to {}: {}", context, error),
            None => format!("IO error: {}", error),
        };
        Self::new(ErrorCode::InternalIoError, message, json!({ "error": error, "context": context }))
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(ErrorCode::InternalUnexpected, error.clone(), json!({ "error": error }))
    }
}

//! The JSON envelope printed on stdout, and the process exit code for each error.

use std::io::{self, Write};

use deckhand::error::Hint;
use deckhand::{Error, ErrorCode, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct Envelope<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody<'a>>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    details: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    hints: Option<&'a [Hint]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
}

impl<'a> Envelope<'a> {
    fn from_result(result: &'a Result<Value>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self {
                success: false,
                data: None,
                error: Some(ErrorBody {
                    code: err.code.as_str(),
                    message: &err.message,
                    details: &err.details,
                    hints: Some(err.hints.as_slice()).filter(|h| !h.is_empty()),
                    retryable: err.retryable,
                }),
            },
        }
    }
}

/// Print the envelope for a command result. A closed pipe (`| head`) is not an error.
pub fn print_result(result: Result<Value>) {
    let payload = match serde_json::to_string_pretty(&Envelope::from_result(&result)) {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("Failed to serialize response: {}", err);
            return;
        }
    };

    if let Err(err) = writeln!(io::stdout().lock(), "{}", payload) {
        if err.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("Failed to write response: {}", err);
        }
    }
}

/// Serialize a handler's output, keeping its exit code; errors take the code of their kind.
pub fn map_cmd_result_to_json<T: Serialize>(result: Result<(T, i32)>) -> (Result<Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(err.to_string(), Some("serialize response".to_string()))),
                exit_code_for_error(ErrorCode::InternalJsonError),
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for_error(err.code);
            (Err(err), exit_code)
        }
    }
}

/// 2 bad input, 4 unknown record, 10 unusable server, 20 remote or cloud failure, 1 internal.
pub fn exit_code_for_error(code: ErrorCode) -> i32 {
    use ErrorCode::*;

    match code {
        ConfigMissingKey | ConfigInvalidJson | ConfigInvalidValue | ConfigIdCollision => 2,
        ValidationMissingArgument | ValidationInvalidArgument | ValidationInvalidJson => 2,
        ReleaseInvalidId => 2,

        ProjectNotFound | ServerNotFound | ResourceNotFound | ReleaseNotFound => 4,

        SshServerInvalid | SshIdentityFileNotFound => 10,

        RemoteCommandFailed | DeployLocked => 20,
        GitRevisionNotFound | GitCommandFailed => 20,
        CloudCommandFailed | CloudImageFailed | CloudTimeout => 20,

        InternalIoError | InternalJsonError | InternalUnexpected => 1,
    }
}

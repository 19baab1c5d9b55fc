use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-visible failure, serialized as the `error` member of a failed response.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{format}")]
pub struct ErrorResponse {
    pub id: i64,
    pub format: String,
}

impl ErrorResponse {
    /// The adapter does not implement the requested command.
    pub const UNKNOWN_COMMAND: i64 = 1014;
    /// The request arguments could not be decoded for the command.
    pub const INVALID_ARGUMENTS: i64 = 1015;
    /// Generic failure raised by the debug session; specific session errors use 2002+.
    pub const ADAPTER_FAILURE: i64 = 2000;
    /// A pending request was dropped because its context went away.
    pub const REQUEST_ABANDONED: i64 = 2001;

    pub fn new(id: i64, format: impl Into<String>) -> Self {
        Self {
            id,
            format: format.into(),
        }
    }

    pub fn unknown_command(command: &str) -> Self {
        Self::new(
            Self::UNKNOWN_COMMAND,
            format!("Unrecognized request: {command}"),
        )
    }

    pub fn invalid_arguments(command: &str, err: &serde_json::Error) -> Self {
        Self::new(
            Self::INVALID_ARGUMENTS,
            format!("Invalid arguments for '{command}': {err}"),
        )
    }

    pub fn adapter(message: impl Into<String>) -> Self {
        Self::new(Self::ADAPTER_FAILURE, message)
    }

    pub fn is_unknown_command(&self) -> bool {
        self.id == Self::UNKNOWN_COMMAND
    }
}

//! Error types for request dispatch failures.
//!
//! Each variant is a distinct failure a client can be told about. The
//! [`Display`](std::fmt::Display) text becomes the `message` of the error
//! response, so it is written for the client rather than the operator.

use std::io;

use thiserror::Error;

/// Errors surfaced while parsing, routing, or executing a command.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line is not valid JSON.
    #[error("malformed request: {message}")]
    MalformedJson {
        /// Parser diagnostic.
        message: String,
        /// Underlying parser error, when there is one.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request JSON does not match the `{"name", "args"}` shape.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// What was wrong with the shape.
        message: String,
    },

    /// No command is registered under the requested name.
    #[error("unknown command: {name}")]
    UnknownCommand {
        /// Requested command name.
        name: String,
    },

    /// Wrong number or type of arguments.
    #[error("invalid arguments for {command}: {message}")]
    InvalidArguments {
        /// Command being invoked.
        command: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// Offset text is not hexadecimal.
    #[error("invalid offset '{text}': expected hexadecimal")]
    InvalidOffset {
        /// Offset text as sent.
        text: String,
    },

    /// Length text is not a decimal number.
    #[error("invalid length '{text}': expected decimal")]
    InvalidLength {
        /// Length text as sent.
        text: String,
    },

    /// Requested length exceeds the per-request maximum.
    #[error("length {length} exceeds the maximum of {max} bytes")]
    LengthTooLarge {
        /// Requested length.
        length: u64,
        /// Largest length served.
        max: usize,
    },

    /// The file could not be opened.
    #[error("cannot open '{path}': {source}")]
    Open {
        /// Path as sent.
        path: String,
        /// OS failure.
        #[source]
        source: io::Error,
    },

    /// The offset lies past the end of the file.
    #[error("offset {offset:#x} is beyond the end of '{path}' ({size} bytes)")]
    OffsetBeyondEnd {
        /// Path as sent.
        path: String,
        /// Requested offset.
        offset: u64,
        /// File size.
        size: u64,
    },

    /// Fewer bytes were available than requested.
    #[error("short read from '{path}': wanted {expected} bytes, got {actual}")]
    ShortRead {
        /// Path as sent.
        path: String,
        /// Requested length.
        expected: usize,
        /// Bytes actually read.
        actual: usize,
    },

    /// I/O error while reading a file that opened successfully.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Response header serialisation failed.
    #[error("failed to serialise response: {0}")]
    SerializeResponse(#[from] serde_json::Error),
}

impl DispatchError {
    /// Creates a malformed-JSON error from a parser error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJson {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed-JSON error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJson {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an unknown command error.
    pub fn unknown_command(name: impl Into<String>) -> Self {
        Self::UnknownCommand { name: name.into() }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            command: command.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by the request itself rather than the host.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::SerializeResponse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_error_names_the_text() {
        let error = DispatchError::InvalidOffset {
            text: String::from("zz"),
        };
        assert_eq!(error.to_string(), "invalid offset 'zz': expected hexadecimal");
    }

    #[test]
    fn io_failures_are_not_client_errors() {
        let error = DispatchError::from(io::Error::other("disk"));
        assert!(!error.is_client_error());
        assert!(DispatchError::unknown_command("x").is_client_error());
    }
}

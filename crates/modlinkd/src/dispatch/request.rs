//! Request parsing for command lines.
//!
//! A request line is a JSON object `{"name": <string>, "args": [...]}`.
//! Unknown fields are ignored and `args` defaults to an empty list.

use serde::Deserialize;
use serde_json::Value;

use super::errors::DispatchError;

/// Parsed command request from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandRequest {
    /// Command name, matched case-sensitively against the registry.
    pub name: String,
    /// Positional arguments forwarded verbatim to the command.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CommandRequest {
    /// Parses one request line.
    ///
    /// Trailing whitespace, including a `\r` left by CRLF clients, is trimmed
    /// first. Text that is not JSON at all is reported separately from JSON
    /// that has the wrong shape.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedJson` for empty or non-JSON input and
    /// `DispatchError::InvalidStructure` when the JSON is not a request.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }

        let value: Value = serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)?;
        if !value.is_object() {
            return Err(DispatchError::invalid_structure(
                "request must be a JSON object",
            ));
        }
        serde_json::from_value(value)
            .map_err(|error| DispatchError::invalid_structure(error.to_string()))
    }

    /// Rejects requests with a blank command name.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidStructure` if `name` is empty or
    /// whitespace.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::invalid_structure("name field is empty"));
        }
        Ok(())
    }

    /// Command name as sent.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}

//! Name-to-command registry.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::binary_data::{GET_BINARY_DATA, GetBinaryData};
use super::errors::DispatchError;
use super::response::Response;

/// A single named operation a client can invoke.
pub trait Command: Send + Sync {
    /// Runs the command with the request's positional arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] describing why the command failed; the
    /// dispatcher turns it into an error response.
    fn execute(&self, args: &[Value]) -> Result<Response, DispatchError>;
}

impl<F> Command for F
where
    F: Fn(&[Value]) -> Result<Response, DispatchError> + Send + Sync,
{
    fn execute(&self, args: &[Value]) -> Result<Response, DispatchError> {
        self(args)
    }
}

/// Commands keyed by their exact, case-sensitive name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every command the server ships with.
    #[must_use]
    pub fn with_builtin_commands() -> Self {
        let mut registry = Self::new();
        registry.register(GET_BINARY_DATA, GetBinaryData);
        registry
    }

    /// Registers `command` under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        command: impl Command + 'static,
    ) -> &mut Self {
        self.commands.insert(name.into(), Box::new(command));
        self
    }

    /// True when a command is registered under exactly `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Looks up the command registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownCommand` when nothing is registered.
    pub fn lookup(&self, name: &str) -> Result<&dyn Command, DispatchError> {
        self.commands
            .get(name)
            .map(Box::as_ref)
            .ok_or_else(|| DispatchError::unknown_command(name))
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

//! The seam between the network core and command logic.

use tracing::{debug, warn};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::registry::CommandRegistry;
use super::request::CommandRequest;
use super::response::Response;

/// Turns one request line into one response.
///
/// The processor calls this serially, one line at a time, so
/// implementations never run concurrently with themselves.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handles a complete request line (without its `\n`).
    fn handle(&self, line: &[u8]) -> Response;
}

/// Parses request lines and routes them through a [`CommandRegistry`].
#[derive(Debug)]
pub struct Dispatcher {
    registry: CommandRegistry,
}

impl Dispatcher {
    /// Creates a dispatcher over an explicit registry.
    #[must_use]
    pub const fn new(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    /// Creates a dispatcher serving the built-in commands.
    #[must_use]
    pub fn with_builtin_commands() -> Self {
        Self::new(CommandRegistry::with_builtin_commands())
    }

    /// Registry the dispatcher routes through.
    #[must_use]
    pub const fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Parses, validates, looks up, and runs the command in `line`.
    ///
    /// # Errors
    ///
    /// Returns the first [`DispatchError`] encountered.
    pub fn dispatch(&self, line: &[u8]) -> Result<Response, DispatchError> {
        let request = CommandRequest::parse(line)?;
        request.validate()?;
        debug!(
            target: DISPATCH_TARGET,
            command = request.name(),
            args = request.args.len(),
            "dispatching command"
        );
        self.registry.lookup(request.name())?.execute(&request.args)
    }
}

impl RequestHandler for Dispatcher {
    fn handle(&self, line: &[u8]) -> Response {
        self.dispatch(line).unwrap_or_else(|error| {
            if error.is_client_error() {
                debug!(target: DISPATCH_TARGET, %error, "request rejected");
            } else {
                warn!(target: DISPATCH_TARGET, %error, "command failed");
            }
            Response::from_error(&error)
        })
    }
}

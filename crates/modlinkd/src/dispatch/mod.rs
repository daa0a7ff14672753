//! Command dispatch for request lines.
//!
//! The network core hands every complete line to a [`RequestHandler`]. The
//! default handler, [`Dispatcher`], parses the line as a JSON command
//! request, looks the command up in a [`CommandRegistry`], runs it, and
//! returns a [`Response`]. Failures never escape as errors; they become
//! error responses for the client.

mod binary_data;
mod errors;
mod handler;
mod registry;
mod request;
mod response;

pub use self::binary_data::{GET_BINARY_DATA, GetBinaryData, MAX_BINARY_LENGTH};
pub use self::errors::DispatchError;
pub use self::handler::{Dispatcher, RequestHandler};
pub use self::registry::{Command, CommandRegistry};
pub use self::request::CommandRequest;
pub use self::response::{Response, ResponseWriter};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

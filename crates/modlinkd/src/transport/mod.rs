//! Network core for the command server.
//!
//! The acceptor binds the listening socket and stages new clients, the
//! multiplexer reads and frames request lines from every client, and the
//! request queue hands complete lines to the processor.

mod acceptor;
mod connection;
mod errors;
mod framing;
mod multiplexer;
#[cfg(test)]
mod multiplexer_tests;
mod queue;
mod readiness;

pub(crate) use self::acceptor::{Acceptor, BoundListener, StagingArea};
pub(crate) use self::connection::Connection;
pub use self::connection::{ConnectionId, PendingRequest, ReplyChannel};
pub use self::errors::StartupError;
pub(crate) use self::multiplexer::Multiplexer;
pub(crate) use self::queue::RequestQueue;

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

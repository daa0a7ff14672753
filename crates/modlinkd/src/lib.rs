//! Line-delimited JSON command server.
//!
//! `modlinkd` accepts TCP clients, frames each `\n`-terminated line as one
//! request, and runs the requests one at a time through a
//! [`RequestHandler`]. Three threads share the work:
//!
//! - the acceptor waits on the listening socket and stages new clients;
//! - the multiplexer polls every client, reads what is available, frames
//!   complete lines, and queues them;
//! - the processor pops queued lines in arrival order and writes each
//!   response back to the client that sent the request.
//!
//! Every wait is bounded by the configured poll interval, so
//! [`ProtocolServer::stop`] returns promptly: it clears each thread's run
//! flag, joins all three, and then closes every socket exactly once.
//!
//! Responses start with a JSON header line tagged by `type`. Binary
//! responses follow the header with `byte_count` raw bytes:
//!
//! ```text
//! -> {"name":"getBinaryData","args":["data.bin","0x10","4"]}
//! <- {"type":"binary","byte_count":"4"}
//! <- <4 raw bytes>
//! ```

mod dispatch;
mod health;
mod process;
mod processor;
mod server;
pub mod telemetry;
mod transport;

pub use dispatch::{
    Command, CommandRegistry, CommandRequest, DispatchError, Dispatcher, GET_BINARY_DATA,
    GetBinaryData, MAX_BINARY_LENGTH, RequestHandler, Response, ResponseWriter,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    ConfigLoader, LaunchError, LaunchPlan, ShutdownError, ShutdownSignal, StaticConfigLoader,
    SystemConfigLoader, SystemShutdownSignal, run_server, run_server_with,
};
pub use server::{ProtocolServer, ServerError, StopSummary};
pub use telemetry::TelemetryError;
pub use transport::{ConnectionId, PendingRequest, ReplyChannel, StartupError};

#[cfg(test)]
mod tests;

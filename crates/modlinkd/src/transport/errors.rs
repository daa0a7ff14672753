//! Error types for binding the listening socket.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while resolving, binding, or listening on the endpoint.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The configured host name could not be resolved.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but yielded no addresses.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// The listening socket could not be created.
    #[error("failed to create listening socket for {addr}: {source}")]
    CreateSocket {
        /// Address the socket was created for.
        addr: SocketAddr,
        /// OS failure.
        #[source]
        source: io::Error,
    },
    /// Binding to the address failed, usually because the port is taken.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address the bind targeted.
        addr: SocketAddr,
        /// OS failure.
        #[source]
        source: io::Error,
    },
    /// Switching the bound socket to the listening state failed.
    #[error("failed to listen on {addr} with backlog {backlog}: {source}")]
    Listen {
        /// Bound address.
        addr: SocketAddr,
        /// Requested backlog.
        backlog: i32,
        /// OS failure.
        #[source]
        source: io::Error,
    },
}

//! Accepted client connections and the requests framed from them.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::TRANSPORT_TARGET;
use super::framing::LineBuffer;

const REPLY_RETRY_BACKOFF: Duration = Duration::from_millis(2);

/// Identifier assigned to each accepted client, unique for the server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value of the identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Why a connection was scheduled for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisconnectReason {
    /// The peer closed its end.
    Closed,
    /// Readiness reported a hang-up.
    HangUp,
    /// Readiness reported a socket error or an invalid descriptor.
    SocketError,
    /// A read failed in a way that ends the session.
    ReadFailed,
    /// The peer sent an unterminated line longer than the configured cap.
    LineTooLong,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Closed => "closed by peer",
            Self::HangUp => "hang-up",
            Self::SocketError => "socket error",
            Self::ReadFailed => "read failed",
            Self::LineTooLong => "request line too long",
        };
        formatter.write_str(text)
    }
}

/// Result of one receive attempt on a readable connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiveOutcome {
    /// Bytes were appended to the receive buffer.
    Received(usize),
    /// Nothing to read right now.
    Idle,
    /// The connection must be removed.
    Disconnected(DisconnectReason),
}

/// A client owned by the multiplexer between acceptance and removal.
#[derive(Debug)]
pub(crate) struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    buffer: LineBuffer,
    removal: Option<DisconnectReason>,
    reply: Option<Arc<ReplyChannel>>,
}

impl Connection {
    /// Adopts a freshly accepted stream.
    ///
    /// The stream is switched to non-blocking mode; failure is logged and the
    /// connection is kept, since reads only happen after readiness reports
    /// data.
    pub(crate) fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        reply_timeout: Duration,
    ) -> Self {
        if let Err(error) = stream.set_nonblocking(true) {
            warn!(
                target: TRANSPORT_TARGET,
                connection = %id,
                %error,
                "failed to make client socket non-blocking"
            );
        }
        let reply = match stream.try_clone() {
            Ok(writer) => Some(Arc::new(ReplyChannel::new(id, writer, reply_timeout))),
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    connection = %id,
                    %error,
                    "failed to open reply channel; responses will be dropped"
                );
                None
            }
        };
        Self {
            id,
            peer,
            stream,
            buffer: LineBuffer::new(),
            removal: None,
            reply,
        }
    }

    pub(crate) const fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) const fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) const fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub(crate) fn reply(&self) -> Option<Arc<ReplyChannel>> {
        self.reply.clone()
    }

    /// Schedules the connection for removal at the end of the iteration.
    ///
    /// The first reason recorded wins.
    pub(crate) fn mark_for_removal(&mut self, reason: DisconnectReason) {
        self.removal.get_or_insert(reason);
    }

    pub(crate) const fn removal_reason(&self) -> Option<DisconnectReason> {
        self.removal
    }

    pub(crate) const fn is_marked(&self) -> bool {
        self.removal.is_some()
    }

    /// Reads exactly the bytes currently available into the receive buffer.
    ///
    /// The available count comes from peeking into `scratch`; a zero-length
    /// peek means the peer closed the connection.
    pub(crate) fn receive(&mut self, scratch: &mut [u8]) -> ReceiveOutcome {
        let available = match self.stream.peek(scratch) {
            Ok(0) => return ReceiveOutcome::Disconnected(DisconnectReason::Closed),
            Ok(count) => count,
            Err(error) if is_transient(&error) => return ReceiveOutcome::Idle,
            Err(error) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    connection = %self.id,
                    %error,
                    "could not determine available bytes"
                );
                return ReceiveOutcome::Disconnected(DisconnectReason::ReadFailed);
            }
        };

        let Some(window) = scratch.get_mut(..available) else {
            return ReceiveOutcome::Idle;
        };
        match self.stream.read(window) {
            Ok(0) => ReceiveOutcome::Disconnected(DisconnectReason::Closed),
            Ok(count) => {
                self.buffer.extend(window.get(..count).unwrap_or_default());
                ReceiveOutcome::Received(count)
            }
            Err(error) if is_transient(&error) => ReceiveOutcome::Idle,
            Err(error) if is_terminal(&error) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    connection = %self.id,
                    %error,
                    "read failed"
                );
                ReceiveOutcome::Disconnected(DisconnectReason::ReadFailed)
            }
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    connection = %self.id,
                    %error,
                    "unexpected read error; keeping connection"
                );
                ReceiveOutcome::Idle
            }
        }
    }

    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        self.buffer.next_line()
    }

    pub(crate) fn compact(&mut self) {
        self.buffer.compact();
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.buffer.pending_len()
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn is_terminal(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Write half of a client connection, shared with every request it sent.
///
/// Writes are serialised through a mutex and bounded by a deadline so a
/// client that stops reading cannot stall the processor indefinitely.
#[derive(Debug)]
pub struct ReplyChannel {
    connection: ConnectionId,
    stream: Mutex<TcpStream>,
    timeout: Duration,
}

impl ReplyChannel {
    pub(crate) fn new(connection: ConnectionId, stream: TcpStream, timeout: Duration) -> Self {
        Self {
            connection,
            stream: Mutex::new(stream),
            timeout,
        }
    }

    /// Connection this channel writes to.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Writes an encoded response in full.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the peer is gone, stops accepting bytes, or
    /// the write deadline passes.
    pub fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        write_with_deadline(&mut *stream, bytes, self.timeout)
    }
}

fn write_with_deadline<W: Write>(
    writer: &mut W,
    mut bytes: &[u8],
    timeout: Duration,
) -> io::Result<()> {
    let deadline = Instant::now() + timeout;
    while !bytes.is_empty() {
        match writer.write(bytes) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "client stopped accepting response bytes",
                ));
            }
            Ok(written) => bytes = bytes.get(written..).unwrap_or_default(),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "response write deadline elapsed",
                    ));
                }
                thread::sleep(REPLY_RETRY_BACKOFF);
            }
            Err(error) => return Err(error),
        }
    }
    writer.flush()
}

/// One complete request line together with where its response goes.
#[derive(Debug)]
pub struct PendingRequest {
    connection: ConnectionId,
    line: Vec<u8>,
    reply: Option<Arc<ReplyChannel>>,
}

impl PendingRequest {
    pub(crate) fn new(
        connection: ConnectionId,
        line: Vec<u8>,
        reply: Option<Arc<ReplyChannel>>,
    ) -> Self {
        Self {
            connection,
            line,
            reply,
        }
    }

    /// Connection the line was read from.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Raw request bytes without the trailing newline.
    #[must_use]
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    /// Channel the response should be written to, if the client has one.
    #[must_use]
    pub fn reply(&self) -> Option<&ReplyChannel> {
        self.reply.as_deref()
    }
}

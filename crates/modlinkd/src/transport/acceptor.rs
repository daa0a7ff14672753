//! Listening socket setup and the accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::AsFd;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use modlink_config::ListenEndpoint;

use super::connection::{Connection, ConnectionId};
use super::readiness::{ERROR_BACKOFF, wait_readable};
use super::{StartupError, TRANSPORT_TARGET};

/// Listening socket ready to hand to the acceptor thread.
#[derive(Debug)]
pub(crate) struct BoundListener {
    endpoint: ListenEndpoint,
    listener: TcpListener,
    local_addr: SocketAddr,
    nonblocking: bool,
}

impl BoundListener {
    /// Resolves, binds, and listens on `endpoint`.
    ///
    /// When `nonblocking` is requested but the socket refuses it, the listener
    /// stays blocking and the accept loop takes one client per readiness
    /// event instead.
    pub(crate) fn bind(
        endpoint: &ListenEndpoint,
        backlog: i32,
        nonblocking: bool,
    ) -> Result<Self, StartupError> {
        let addr = resolve(endpoint)?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| StartupError::CreateSocket { addr, source })?;
        if let Err(error) = socket.set_reuse_address(true) {
            warn!(
                target: TRANSPORT_TARGET,
                %error,
                "failed to enable address reuse on listening socket"
            );
        }
        let nonblocking = nonblocking && enable_nonblocking(&socket);
        socket
            .bind(&addr.into())
            .map_err(|source| StartupError::BindTcp { addr, source })?;
        socket
            .listen(backlog)
            .map_err(|source| StartupError::Listen {
                addr,
                backlog,
                source,
            })?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr().unwrap_or(addr);
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
            local_addr,
            nonblocking,
        })
    }

    /// Address the OS actually bound, with any ephemeral port filled in.
    pub(crate) const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) const fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }
}

fn enable_nonblocking(socket: &Socket) -> bool {
    match socket.set_nonblocking(true) {
        Ok(()) => true,
        Err(error) => {
            warn!(
                target: TRANSPORT_TARGET,
                %error,
                "non-blocking accept unavailable; accepting one client per wake-up"
            );
            false
        }
    }
}

fn resolve(endpoint: &ListenEndpoint) -> Result<SocketAddr, StartupError> {
    let host = endpoint.host();
    let port = endpoint.port();
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| StartupError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    addrs.next().ok_or_else(|| StartupError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })
}

/// Lock-guarded hand-off list between the acceptor and the multiplexer.
#[derive(Debug, Default)]
pub(crate) struct StagingArea {
    connections: Mutex<Vec<Connection>>,
}

impl StagingArea {
    pub(crate) fn stage(&self, batch: Vec<Connection>) {
        self.lock().extend(batch);
    }

    pub(crate) fn take_all(&self) -> Vec<Connection> {
        std::mem::take(&mut *self.lock())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// What the accept loop does after `accept` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// No more pending clients for this wake-up.
    Drained,
    /// Interrupted, or the client went away before it was accepted; try
    /// the next one at once.
    Retry,
    /// Resource exhaustion or another hard error; pause before polling.
    Backoff,
}

impl AcceptFailure {
    fn classify(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::WouldBlock => Self::Drained,
            io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted => Self::Retry,
            _ => Self::Backoff,
        }
    }
}

/// Accept loop state, run on its own thread.
#[derive(Debug)]
pub(crate) struct Acceptor {
    listener: BoundListener,
    staging: Arc<StagingArea>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    reply_timeout: Duration,
    next_id: u64,
    last_error: Option<io::ErrorKind>,
}

impl Acceptor {
    pub(crate) fn new(
        listener: BoundListener,
        staging: Arc<StagingArea>,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            staging,
            running,
            poll_interval,
            reply_timeout,
            next_id: 0,
            last_error: None,
        }
    }

    /// Accepts clients until the running flag clears, then hands the
    /// listening socket back to the caller for closing.
    pub(crate) fn run(mut self) -> BoundListener {
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %self.listener.endpoint,
            local_addr = %self.listener.local_addr,
            nonblocking = self.listener.is_nonblocking(),
            "acceptor active"
        );
        while self.running.load(Ordering::SeqCst) {
            self.poll_once();
        }
        info!(
            target: TRANSPORT_TARGET,
            accepted = self.next_id,
            "acceptor stopped"
        );
        self.listener
    }

    fn poll_once(&mut self) {
        match wait_readable(self.listener.listener.as_fd(), self.poll_interval) {
            Ok(true) => self.accept_ready(),
            Ok(false) | Err(Errno::EINTR) => {}
            Err(errno) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    error = %errno,
                    "waiting for incoming connections failed"
                );
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    fn accept_ready(&mut self) {
        let mut accepted = Vec::new();
        let mut backoff = false;
        loop {
            match self.listener.listener.accept() {
                Ok((stream, peer)) => {
                    self.last_error = None;
                    let id = self.allocate_id();
                    info!(
                        target: TRANSPORT_TARGET,
                        connection = %id,
                        peer = %peer,
                        "client connected"
                    );
                    accepted.push(Connection::new(id, stream, peer, self.reply_timeout));
                    if !self.listener.nonblocking {
                        break;
                    }
                }
                Err(error) => match AcceptFailure::classify(error.kind()) {
                    // A blocking listener must not re-enter `accept` without readiness.
                    AcceptFailure::Retry if self.listener.nonblocking => {}
                    AcceptFailure::Drained | AcceptFailure::Retry => break,
                    AcceptFailure::Backoff => {
                        self.record_error(&error);
                        backoff = true;
                        break;
                    }
                },
            }
        }
        if !accepted.is_empty() {
            debug!(
                target: TRANSPORT_TARGET,
                count = accepted.len(),
                "staging accepted clients"
            );
            self.staging.stage(accepted);
        }
        // The listener stays readable while the failure persists.
        if backoff {
            thread::sleep(ERROR_BACKOFF);
        }
    }

    fn allocate_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId::new(self.next_id)
    }

    fn record_error(&mut self, error: &io::Error) {
        let kind = error.kind();
        if self.last_error != Some(kind) {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "accept failed"
            );
        }
        self.last_error = Some(kind);
    }
}

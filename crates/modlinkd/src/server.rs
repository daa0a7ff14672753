//! Server lifecycle: bind, spawn the three workers, and shut them down.
//!
//! [`ProtocolServer`] owns the listening socket until `start`, after which
//! each worker thread owns its sockets and hands them back when it exits.
//! `stop` clears the run flags, joins every worker, and only then closes the
//! listener, the active and staged connections, and any queued requests.

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info, warn};

use modlink_config::Config;

use crate::dispatch::RequestHandler;
use crate::health::HealthReporter;
use crate::processor::Processor;
use crate::transport::{
    Acceptor, BoundListener, Connection, Multiplexer, PendingRequest, RequestQueue, StagingArea,
    StartupError,
};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

const ACCEPT_THREAD: &str = "modlink-accept";
const MULTIPLEX_THREAD: &str = "modlink-mux";
const PROCESS_THREAD: &str = "modlink-process";

/// Errors raised by server lifecycle operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called before a successful `initialize`.
    #[error("server has not been initialised")]
    NotInitialized,
    /// `initialize` was called while a listener is already bound.
    #[error("server is already initialised")]
    AlreadyInitialized,
    /// `initialize` or `start` was called while the workers are running.
    #[error("server is already running")]
    AlreadyRunning,
    /// The listening socket could not be set up.
    #[error(transparent)]
    Startup(#[from] StartupError),
    /// A worker thread could not be spawned.
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        /// Name of the thread.
        thread: &'static str,
        /// OS failure.
        #[source]
        source: io::Error,
    },
    /// A worker thread panicked before shutdown completed.
    #[error("{thread} thread panicked")]
    ThreadPanic {
        /// Name of the thread.
        thread: &'static str,
    },
}

/// Counts reported once the server has fully stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StopSummary {
    /// Client connections closed by shutdown, active or still staged.
    pub closed_connections: usize,
    /// Framed requests that were never processed.
    pub discarded_requests: usize,
    /// Requests the processor handled during the run.
    pub processed_requests: usize,
}

/// One run flag per worker loop.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeFlags {
    accepting: Arc<AtomicBool>,
    receiving: Arc<AtomicBool>,
    processing: Arc<AtomicBool>,
}

impl RuntimeFlags {
    fn raised() -> Self {
        Self {
            accepting: Arc::new(AtomicBool::new(true)),
            receiving: Arc::new(AtomicBool::new(true)),
            processing: Arc::new(AtomicBool::new(true)),
        }
    }

    fn clear_all(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.receiving.store(false, Ordering::SeqCst);
        self.processing.store(false, Ordering::SeqCst);
    }
}

/// Line-delimited command server.
pub struct ProtocolServer {
    config: Config,
    handler: Arc<dyn RequestHandler>,
    reporter: Arc<dyn HealthReporter>,
    state: ServerState,
}

enum ServerState {
    Idle,
    Initialized(BoundListener),
    Running(Workers),
}

struct Workers {
    flags: RuntimeFlags,
    local_addr: SocketAddr,
    staging: Arc<StagingArea>,
    queue: Arc<RequestQueue<PendingRequest>>,
    acceptor: JoinHandle<BoundListener>,
    multiplexer: JoinHandle<Vec<Connection>>,
    processor: JoinHandle<usize>,
}

impl ProtocolServer {
    /// Creates a server that will route every request line to `handler`.
    pub fn new(
        config: Config,
        handler: Arc<dyn RequestHandler>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            config,
            handler,
            reporter,
            state: ServerState::Idle,
        }
    }

    /// Configuration the server was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Binds and listens on the configured endpoint.
    ///
    /// Returns the bound address, which carries the real port when the
    /// configuration asked for port `0`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Startup`] when the socket cannot be created,
    /// resolved, bound, or put into the listening state, and a state error
    /// when a listener is already bound.
    pub fn initialize(&mut self) -> Result<SocketAddr, ServerError> {
        match self.state {
            ServerState::Idle => {}
            ServerState::Initialized(_) => return Err(ServerError::AlreadyInitialized),
            ServerState::Running(_) => return Err(ServerError::AlreadyRunning),
        }

        let endpoint = self.config.listen_endpoint();
        self.reporter.initialize_starting(&endpoint);
        match BoundListener::bind(&endpoint, self.config.backlog, self.config.nonblocking_accept) {
            Ok(listener) => {
                let local_addr = listener.local_addr();
                self.reporter.initialize_succeeded(local_addr);
                self.state = ServerState::Initialized(listener);
                Ok(local_addr)
            }
            Err(error) => {
                let error = ServerError::from(error);
                self.reporter.initialize_failed(&error);
                Err(error)
            }
        }
    }

    /// Starts the acceptor, multiplexer, and processor threads.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotInitialized`] without a bound listener,
    /// [`ServerError::AlreadyRunning`] when called twice, and
    /// [`ServerError::Spawn`] when a thread cannot be created. A spawn
    /// failure stops the threads already started and closes the listener.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let listener = match mem::replace(&mut self.state, ServerState::Idle) {
            ServerState::Initialized(listener) => listener,
            ServerState::Running(workers) => {
                self.state = ServerState::Running(workers);
                return Err(ServerError::AlreadyRunning);
            }
            ServerState::Idle => return Err(ServerError::NotInitialized),
        };

        let workers = self.spawn_workers(listener)?;
        info!(
            target: SERVER_TARGET,
            local_addr = %workers.local_addr,
            "worker threads started"
        );
        self.state = ServerState::Running(workers);
        self.reporter.server_started();
        Ok(())
    }

    /// Stops the workers and closes every socket.
    ///
    /// Calling `stop` on a server that is not running is a no-op returning an
    /// empty summary; a bound but unstarted listener is closed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ThreadPanic`] when a worker panicked. Sockets
    /// are closed either way.
    pub fn stop(&mut self) -> Result<StopSummary, ServerError> {
        match mem::replace(&mut self.state, ServerState::Idle) {
            ServerState::Idle => Ok(StopSummary::default()),
            ServerState::Initialized(listener) => {
                debug!(
                    target: SERVER_TARGET,
                    local_addr = %listener.local_addr(),
                    "closing unstarted listener"
                );
                drop(listener);
                Ok(StopSummary::default())
            }
            ServerState::Running(workers) => {
                self.reporter.server_stopping();
                let (summary, panicked) = workers.shutdown();
                self.reporter.server_stopped(&summary);
                match panicked {
                    Some(thread) => Err(ServerError::ThreadPanic { thread }),
                    None => Ok(summary),
                }
            }
        }
    }

    /// True between a successful `start` and the next `stop`.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Running(_))
    }

    /// Bound address while initialised or running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            ServerState::Idle => None,
            ServerState::Initialized(listener) => Some(listener.local_addr()),
            ServerState::Running(workers) => Some(workers.local_addr),
        }
    }

    fn spawn_workers(&self, listener: BoundListener) -> Result<Workers, ServerError> {
        let flags = RuntimeFlags::raised();
        let staging = Arc::new(StagingArea::default());
        let queue = Arc::new(RequestQueue::new());
        let local_addr = listener.local_addr();

        let acceptor = Acceptor::new(
            listener,
            Arc::clone(&staging),
            Arc::clone(&flags.accepting),
            self.config.poll_interval(),
            self.config.reply_timeout(),
        );
        let acceptor = spawn_worker(ACCEPT_THREAD, move || acceptor.run())?;

        let multiplexer = Multiplexer::new(
            Arc::clone(&staging),
            Arc::clone(&queue),
            Arc::clone(&flags.receiving),
            self.config.poll_interval(),
            self.config.max_line_bytes,
        );
        let multiplexer = match spawn_worker(MULTIPLEX_THREAD, move || multiplexer.run()) {
            Ok(handle) => handle,
            Err(error) => {
                flags.clear_all();
                discard_worker(acceptor);
                return Err(error);
            }
        };

        let processor = Processor::new(
            Arc::clone(&queue),
            Arc::clone(&self.handler),
            Arc::clone(&flags.processing),
            self.config.queue_wait(),
        );
        let processor = match spawn_worker(PROCESS_THREAD, move || processor.run()) {
            Ok(handle) => handle,
            Err(error) => {
                flags.clear_all();
                discard_worker(acceptor);
                discard_worker(multiplexer);
                drop(staging.take_all());
                drop(queue.drain());
                return Err(error);
            }
        };

        Ok(Workers {
            flags,
            local_addr,
            staging,
            queue,
            acceptor,
            multiplexer,
            processor,
        })
    }
}

impl Workers {
    /// Clears every flag, joins every worker, then closes what they owned.
    fn shutdown(self) -> (StopSummary, Option<&'static str>) {
        self.flags.clear_all();
        let listener = self.acceptor.join();
        let active = self.multiplexer.join();
        let processed = self.processor.join();

        let mut summary = StopSummary::default();
        let mut panicked = None;
        match listener {
            Ok(listener) => drop(listener),
            Err(_) => panicked = Some(ACCEPT_THREAD),
        }
        match active {
            Ok(connections) => {
                summary.closed_connections += connections.len();
                drop(connections);
            }
            Err(_) => {
                panicked.get_or_insert(MULTIPLEX_THREAD);
            }
        }
        let staged = self.staging.take_all();
        summary.closed_connections += staged.len();
        drop(staged);
        summary.discarded_requests = self.queue.drain().len();
        match processed {
            Ok(count) => summary.processed_requests = count,
            Err(_) => {
                panicked.get_or_insert(PROCESS_THREAD);
            }
        }

        info!(
            target: SERVER_TARGET,
            closed_connections = summary.closed_connections,
            discarded_requests = summary.discarded_requests,
            processed_requests = summary.processed_requests,
            "server stopped"
        );
        (summary, panicked)
    }
}

impl Drop for ProtocolServer {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(target: SERVER_TARGET, %error, "server shutdown incomplete");
        }
    }
}

fn spawn_worker<T, F>(name: &'static str, body: F) -> Result<JoinHandle<T>, ServerError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(body)
        .map_err(|source| ServerError::Spawn {
            thread: name,
            source,
        })
}

fn discard_worker<T>(handle: JoinHandle<T>) {
    if handle.join().is_err() {
        warn!(target: SERVER_TARGET, "worker panicked during aborted start");
    }
}

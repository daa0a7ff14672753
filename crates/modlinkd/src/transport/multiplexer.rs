//! Readiness multiplexing over every active client.
//!
//! One thread owns the active connection set. Each iteration merges newly
//! staged clients, waits (bounded) for readiness, reads whatever arrived,
//! frames complete lines into the request queue, and finally drops the
//! connections marked for removal.

use std::os::fd::AsFd;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, poll};
use tracing::{debug, info, warn};

use super::TRANSPORT_TARGET;
use super::acceptor::StagingArea;
use super::connection::{Connection, DisconnectReason, PendingRequest, ReceiveOutcome};
use super::queue::RequestQueue;
use super::readiness::{ERROR_BACKOFF, failure_flags, interest, poll_timeout};

/// Scratch size used to discover how many bytes a client has pending.
const READ_CHUNK_BYTES: usize = 1024;

/// Counters describing one multiplexer iteration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IterationReport {
    pub(crate) merged: usize,
    pub(crate) enqueued: usize,
    pub(crate) removed: usize,
}

#[derive(Debug)]
pub(crate) struct Multiplexer {
    active: Vec<Connection>,
    readiness: Vec<Option<PollFlags>>,
    staging: Arc<StagingArea>,
    queue: Arc<RequestQueue<PendingRequest>>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    max_line_bytes: usize,
    scratch: Box<[u8]>,
}

impl Multiplexer {
    pub(crate) fn new(
        staging: Arc<StagingArea>,
        queue: Arc<RequestQueue<PendingRequest>>,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
        max_line_bytes: usize,
    ) -> Self {
        Self {
            active: Vec::new(),
            readiness: Vec::new(),
            staging,
            queue,
            running,
            poll_interval,
            max_line_bytes,
            scratch: vec![0; READ_CHUNK_BYTES].into_boxed_slice(),
        }
    }

    /// Services clients until the running flag clears, then returns the
    /// connections still open so the caller can close them.
    pub(crate) fn run(mut self) -> Vec<Connection> {
        info!(target: TRANSPORT_TARGET, "multiplexer active");
        while self.running.load(Ordering::SeqCst) {
            let report = self.iterate();
            if report.merged > 0 || report.removed > 0 {
                debug!(
                    target: TRANSPORT_TARGET,
                    merged = report.merged,
                    removed = report.removed,
                    open = self.active.len(),
                    "client set changed"
                );
            }
        }
        info!(
            target: TRANSPORT_TARGET,
            open = self.active.len(),
            "multiplexer stopped"
        );
        self.active
    }

    pub(crate) fn iterate(&mut self) -> IterationReport {
        let mut report = IterationReport {
            merged: self.merge_staged(),
            ..IterationReport::default()
        };
        if self.active.is_empty() {
            thread::sleep(self.poll_interval);
            return report;
        }

        match self.wait_for_readiness() {
            Ok(0) | Err(Errno::EINTR) => return report,
            Ok(_) => {}
            Err(errno) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    error = %errno,
                    clients = self.active.len(),
                    "readiness wait failed"
                );
                thread::sleep(ERROR_BACKOFF);
                return report;
            }
        }
        if !self.running.load(Ordering::SeqCst) {
            return report;
        }

        self.service_ready();
        report.enqueued = self.frame_requests();
        report.removed = self.sweep();
        if report.enqueued > 0 {
            self.queue.notify_waiters();
        }
        report
    }

    #[cfg(test)]
    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }

    fn merge_staged(&mut self) -> usize {
        let staged = self.staging.take_all();
        let merged = staged.len();
        self.active.extend(staged);
        merged
    }

    fn wait_for_readiness(&mut self) -> Result<i32, Errno> {
        if self.readiness.len() != self.active.len() {
            self.readiness = vec![None; self.active.len()];
        }
        // `PollFd` borrows each stream, so the poll set lives only for this
        // call; the result slots above persist until the set size changes.
        let mut fds: Vec<PollFd<'_>> = self
            .active
            .iter()
            .map(|connection| PollFd::new(connection.stream().as_fd(), interest()))
            .collect();
        let ready = poll(&mut fds, poll_timeout(self.poll_interval))?;
        for (slot, fd) in self.readiness.iter_mut().zip(&fds) {
            *slot = fd.revents();
        }
        Ok(ready)
    }

    fn service_ready(&mut self) {
        for (connection, revents) in self.active.iter_mut().zip(&self.readiness) {
            let Some(flags) = *revents else {
                continue;
            };
            if flags.contains(PollFlags::POLLIN) {
                match connection.receive(&mut self.scratch) {
                    ReceiveOutcome::Received(count) => {
                        debug!(
                            target: TRANSPORT_TARGET,
                            connection = %connection.id(),
                            bytes = count,
                            "received bytes"
                        );
                    }
                    ReceiveOutcome::Idle => {}
                    ReceiveOutcome::Disconnected(reason) => connection.mark_for_removal(reason),
                }
            }
            if flags.intersects(failure_flags()) {
                let reason = if flags.contains(PollFlags::POLLHUP) {
                    DisconnectReason::HangUp
                } else {
                    DisconnectReason::SocketError
                };
                connection.mark_for_removal(reason);
            }
        }
    }

    /// Frames complete lines from every connection, including those marked
    /// for removal this iteration.
    ///
    /// Only the unterminated tail of a marked connection is discarded by the
    /// sweep that follows.
    fn frame_requests(&mut self) -> usize {
        let mut enqueued = 0;
        for connection in &mut self.active {
            while let Some(line) = connection.next_line() {
                self.queue
                    .push(PendingRequest::new(connection.id(), line, connection.reply()));
                enqueued += 1;
            }
            connection.compact();
            if !connection.is_marked() && connection.pending_len() > self.max_line_bytes {
                warn!(
                    target: TRANSPORT_TARGET,
                    connection = %connection.id(),
                    pending = connection.pending_len(),
                    limit = self.max_line_bytes,
                    "request line exceeds limit"
                );
                connection.mark_for_removal(DisconnectReason::LineTooLong);
            }
        }
        enqueued
    }

    fn sweep(&mut self) -> usize {
        let before = self.active.len();
        self.active.retain(|connection| {
            let Some(reason) = connection.removal_reason() else {
                return true;
            };
            info!(
                target: TRANSPORT_TARGET,
                connection = %connection.id(),
                peer = %connection.peer(),
                reason = %reason,
                discarded = connection.pending_len(),
                "client disconnected"
            );
            false
        });
        before - self.active.len()
    }
}

//! Tests for the readiness multiplexer over loopback sockets.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use socket2::Socket;

use super::acceptor::StagingArea;
use super::connection::{Connection, ConnectionId, PendingRequest};
use super::multiplexer::Multiplexer;
use super::queue::RequestQueue;

const LINE_CAP: usize = 64;

struct Harness {
    listener: TcpListener,
    staging: Arc<StagingArea>,
    queue: Arc<RequestQueue<PendingRequest>>,
    running: Arc<AtomicBool>,
    multiplexer: Multiplexer,
    next_id: u64,
}

impl Harness {
    fn new() -> Self {
        let staging = Arc::new(StagingArea::default());
        let queue = Arc::new(RequestQueue::new());
        let running = Arc::new(AtomicBool::new(true));
        let multiplexer = Multiplexer::new(
            Arc::clone(&staging),
            Arc::clone(&queue),
            Arc::clone(&running),
            Duration::from_millis(20),
            LINE_CAP,
        );
        Self {
            listener: TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback listener"),
            staging,
            queue,
            running,
            multiplexer,
            next_id: 0,
        }
    }

    /// Connects a client and stages the server side for the multiplexer.
    fn connect(&mut self) -> (ConnectionId, TcpStream) {
        let client = TcpStream::connect(self.listener.local_addr().expect("local addr"))
            .expect("connect client");
        let (server, peer) = self.listener.accept().expect("accept client");
        self.next_id += 1;
        let id = ConnectionId::new(self.next_id);
        self.staging.stage(vec![Connection::new(
            id,
            server,
            peer,
            Duration::from_secs(1),
        )]);
        (id, client)
    }

    /// Iterates until `predicate` holds or two seconds pass.
    fn iterate_until(&mut self, mut predicate: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            self.multiplexer.iterate();
            if predicate(self) {
                return true;
            }
        }
        false
    }

    fn queued(&self) -> Vec<(ConnectionId, Vec<u8>)> {
        self.queue
            .drain()
            .into_iter()
            .map(|request| (request.connection(), request.line().to_vec()))
            .collect()
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[rstest]
fn frames_lines_from_interleaved_clients(mut harness: Harness) {
    let (first_id, mut first) = harness.connect();
    let (second_id, mut second) = harness.connect();

    first.write_all(b"{\"name\":\"a\"").expect("write first fragment");
    second.write_all(b"two\n").expect("write second line");
    first.write_all(b"}\n").expect("write first terminator");

    assert!(harness.iterate_until(|h| h.queue.len() >= 2));
    let mut queued = harness.queued();
    queued.sort();
    assert_eq!(
        queued,
        vec![
            (first_id, b"{\"name\":\"a\"}".to_vec()),
            (second_id, b"two".to_vec()),
        ]
    );
}

#[rstest]
fn preserves_per_client_order(mut harness: Harness) {
    let (id, mut client) = harness.connect();
    client.write_all(b"one\ntwo\nthree\n").expect("write lines");

    assert!(harness.iterate_until(|h| h.queue.len() >= 3));
    let lines: Vec<Vec<u8>> = harness
        .queued()
        .into_iter()
        .map(|(connection, line)| {
            assert_eq!(connection, id);
            line
        })
        .collect();
    assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
}

#[rstest]
fn disconnect_discards_partial_line(mut harness: Harness) {
    let (_, mut client) = harness.connect();
    client.write_all(b"never finished").expect("write fragment");
    client.shutdown(Shutdown::Both).expect("shutdown client");
    drop(client);

    assert!(harness.iterate_until(|h| h.multiplexer.active_len() == 0));
    assert_eq!(harness.queue.len(), 0);
}

#[rstest]
fn complete_line_survives_reset_in_same_wake(mut harness: Harness) {
    let (id, mut client) = harness.connect();
    client
        .write_all(b"{\"name\":\"x\"}\n")
        .expect("write request line");
    let socket = Socket::from(client);
    socket
        .set_linger(Some(Duration::ZERO))
        .expect("enable abortive close");
    drop(socket);

    // Data and the reset are both pending before the first poll, so the
    // connection is framed and removed in one iteration.
    let deadline = Instant::now() + Duration::from_secs(2);
    let report = loop {
        let report = harness.multiplexer.iterate();
        if report.removed > 0 || Instant::now() >= deadline {
            break report;
        }
    };
    assert_eq!(report.removed, 1);
    assert_eq!(report.enqueued, 1);
    assert_eq!(harness.multiplexer.active_len(), 0);
    assert_eq!(harness.queued(), vec![(id, b"{\"name\":\"x\"}".to_vec())]);
}

#[rstest]
fn complete_lines_before_close_are_kept(mut harness: Harness) {
    let (id, mut client) = harness.connect();
    client
        .write_all(b"first\nsecond\npartial")
        .expect("write lines and fragment");
    client.shutdown(Shutdown::Both).expect("shutdown client");
    drop(client);

    assert!(harness.iterate_until(|h| h.multiplexer.active_len() == 0));
    assert_eq!(
        harness.queued(),
        vec![(id, b"first".to_vec()), (id, b"second".to_vec())]
    );
}

#[rstest]
fn oversized_line_closes_connection(mut harness: Harness) {
    let (_, mut client) = harness.connect();
    client
        .write_all(&vec![b'x'; LINE_CAP * 2])
        .expect("write oversized fragment");

    assert!(harness.iterate_until(|h| h.multiplexer.active_len() == 0));
    assert_eq!(harness.queue.len(), 0);

    client
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("set read timeout");
    let mut buf = [0_u8; 8];
    let read = client.read(&mut buf).unwrap_or(0);
    assert_eq!(read, 0, "server should have closed the connection");
}

#[rstest]
fn cleared_flag_stops_reading(mut harness: Harness) {
    let (_, mut client) = harness.connect();
    harness.running.store(false, Ordering::SeqCst);
    client.write_all(b"late\n").expect("write line");

    for _ in 0..5 {
        harness.multiplexer.iterate();
    }
    assert_eq!(harness.queue.len(), 0);
}

#[rstest]
fn idle_iteration_merges_staged_clients(mut harness: Harness) {
    let _client = harness.connect();
    let report = harness.multiplexer.iterate();
    assert_eq!(report.merged, 1);
    assert_eq!(harness.multiplexer.active_len(), 1);
}
